//! Virtual bundler manifest.
//!
//! The component-streaming renderer expects a bundler's client manifest to
//! map `(module, export)` to chunk metadata. Nothing is bundled here, so
//! every lookup is answered by computation: one logical chunk per module,
//! fetched by the browser with a native dynamic import of `id`.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Descriptor handed to the renderer for a client reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReferenceMetadata {
    /// `/` + module path relative to the project root.
    pub id: String,
    /// Always empty.
    pub chunks: Vec<String>,
    /// Requested export name, echoed back.
    pub name: String,
    /// Always `true`.
    #[serde(rename = "async")]
    pub is_async: bool,
}

/// Descriptor for `name` exported by `module`.
///
/// `module` may be a `file://` URL or a plain path. Total: every input
/// yields a descriptor.
#[must_use]
pub fn client_reference(cwd: &Path, module: &str, name: &str) -> ClientReferenceMetadata {
    let path = module.strip_prefix("file://").unwrap_or(module);
    ClientReferenceMetadata {
        id: format!("/{}", relative_id(cwd, Path::new(path))),
        chunks: Vec::new(),
        name: name.to_string(),
        is_async: true,
    }
}

/// Forward-slash relative path from `base` to `path`, `..` where needed.
fn relative_id(base: &Path, path: &Path) -> String {
    let base: Vec<Component<'_>> = base.components().collect();
    let path: Vec<Component<'_>> = path.components().collect();
    let common = base
        .iter()
        .zip(path.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = base[common..]
        .iter()
        .filter(|c| matches!(c, Component::Normal(_)))
        .map(|_| "..".to_string());
    let downs = path[common..]
        .iter()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        });

    ups.chain(downs).collect::<Vec<_>>().join("/")
}
