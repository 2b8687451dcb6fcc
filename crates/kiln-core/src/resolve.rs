//! Extensionless file resolution.
//!
//! A URL path such as `/hello` resolves against the project root by probing
//! `hello`, `hello.ts`, `hello.tsx` in that order; the first regular file
//! that exists wins.

use crate::error::Error;
use std::path::{Component, Path, PathBuf};

/// Recognized source extensions, in probe order.
pub const SOURCE_EXTENSIONS: [&str; 2] = [".ts", ".tsx"];

/// Whether a path carries one of the recognized source extensions.
#[must_use]
pub fn has_source_extension(path: &Path) -> bool {
    let name = path.to_string_lossy();
    SOURCE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Whether a path is a `.tsx` file (enables the TSX syntax extension).
#[must_use]
pub fn is_tsx(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".tsx")
}

/// Resolve a URL path or bare name against `cwd`.
///
/// The leading `/` of a URL path is ignored so `/src/App` and `src/App` are
/// the same request. Paths climbing out of `cwd` never resolve.
pub fn resolve_file(cwd: &Path, name: &str) -> Result<PathBuf, Error> {
    let not_found = || Error::FileNotFound {
        name: name.to_string(),
    };

    let relative = normalize_relative(name.trim_start_matches('/')).ok_or_else(not_found)?;
    probe_candidates(&cwd.join(relative)).ok_or_else(not_found)
}

/// Probe `base`, then `base` + each source extension.
#[must_use]
pub fn probe_candidates(base: &Path) -> Option<PathBuf> {
    std::iter::once(String::new())
        .chain(SOURCE_EXTENSIONS.iter().map(|ext| (*ext).to_string()))
        .map(|suffix| {
            let mut candidate = base.as_os_str().to_owned();
            candidate.push(suffix);
            PathBuf::from(candidate)
        })
        .find(|candidate| candidate.is_file())
}

/// Collapse `.` and `..`; `None` when `..` would leave the root.
fn normalize_relative(path: &str) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    return None;
                }
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(result)
}
