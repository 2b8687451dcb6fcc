//! Declared dependency versions from the project's `package.json`.

use crate::error::Error;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The part of `package.json` that matters for CDN URLs.
#[derive(Debug, Deserialize, Default)]
struct PackageJson {
    #[serde(default)]
    dependencies: HashMap<String, String>,
}

/// Maps a package name to the version range declared in `package.json`.
///
/// The manifest is re-read on every lookup so edits show up on the next
/// request without a restart.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    manifest_path: PathBuf,
}

impl VersionResolver {
    #[must_use]
    pub fn new(cwd: &Path) -> Self {
        Self {
            manifest_path: cwd.join("package.json"),
        }
    }

    /// Declared version range for `name`, copied verbatim.
    pub fn version(&self, name: &str) -> Result<Option<String>, Error> {
        let content =
            std::fs::read_to_string(&self.manifest_path).map_err(|e| Error::ManifestRead {
                path: self.manifest_path.clone(),
                reason: e.to_string(),
            })?;
        let pkg: PackageJson = serde_json::from_str(&content).map_err(|e| Error::ManifestRead {
            path: self.manifest_path.clone(),
            reason: e.to_string(),
        })?;
        Ok(pkg.dependencies.get(name).cloned())
    }

    /// `"@<range>"` for a declared dependency, `""` otherwise.
    pub fn version_suffix(&self, name: &str) -> Result<String, Error> {
        Ok(self
            .version(name)?
            .map(|version| format!("@{version}"))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_declared_dependency() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"dependencies": {"lodash": "^4.17.0", "react": "19.0.0"}}"#,
        )
        .unwrap();

        let resolver = VersionResolver::new(temp.path());
        assert_eq!(resolver.version_suffix("lodash").unwrap(), "@^4.17.0");
        assert_eq!(resolver.version_suffix("react").unwrap(), "@19.0.0");
        assert_eq!(resolver.version_suffix("left-pad").unwrap(), "");
    }

    #[test]
    fn test_missing_dependencies_field() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("package.json"), r#"{"name": "app"}"#).unwrap();

        let resolver = VersionResolver::new(temp.path());
        assert_eq!(resolver.version_suffix("react").unwrap(), "");
    }

    #[test]
    fn test_missing_manifest_fails() {
        let temp = TempDir::new().unwrap();
        let resolver = VersionResolver::new(temp.path());
        let err = resolver.version_suffix("react").unwrap_err();
        assert!(matches!(err, Error::ManifestRead { .. }));
    }

    #[test]
    fn test_malformed_manifest_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("package.json"), "{ not json").unwrap();
        let resolver = VersionResolver::new(temp.path());
        assert!(matches!(
            resolver.version("react"),
            Err(Error::ManifestRead { .. })
        ));
    }

    #[test]
    fn test_reads_manifest_per_lookup() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("package.json");
        fs::write(&manifest, r#"{"dependencies": {"react": "18.2.0"}}"#).unwrap();

        let resolver = VersionResolver::new(temp.path());
        assert_eq!(resolver.version_suffix("react").unwrap(), "@18.2.0");

        fs::write(&manifest, r#"{"dependencies": {"react": "19.0.0"}}"#).unwrap();
        assert_eq!(resolver.version_suffix("react").unwrap(), "@19.0.0");
    }
}
