//! Bare import rewriting for browser serving.
//!
//! Browsers cannot resolve `import React from "react"`, so bare specifiers
//! are pointed at a CDN:
//! - `react` → `<cdn>/react@<declared range>`
//! - `lodash/debounce` → `<cdn>/lodash@<declared range>/debounce`
//! - `./App`, `/src/x.ts`, `@scope/pkg`, `https://...` → untouched

use crate::error::Error;
use crate::version::VersionResolver;
use regex_lite::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn bare_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([-\w]+)(/[-\w/]+)?$").ok())
        .as_ref()
}

/// Split a bare specifier into `(package, subpath)`.
///
/// The subpath keeps its leading `/` and is empty when absent. Anything that
/// is not a bare package shape returns `None`.
#[must_use]
pub fn bare_specifier(specifier: &str) -> Option<(&str, &str)> {
    let caps = bare_pattern()?.captures(specifier)?;
    let package = caps.get(1)?.as_str();
    let subpath = caps.get(2).map_or("", |m| m.as_str());
    Some((package, subpath))
}

/// `<cdn_base>/<package><version_suffix><subpath>`.
#[must_use]
pub fn cdn_url(cdn_base: &str, package: &str, version_suffix: &str, subpath: &str) -> String {
    format!("{cdn_base}/{package}{version_suffix}{subpath}")
}

/// Rewrites bare specifiers onto a CDN using declared dependency versions.
#[derive(Debug, Clone)]
pub struct CdnRewriter {
    cdn_base: String,
    versions: VersionResolver,
}

impl CdnRewriter {
    #[must_use]
    pub fn new(cwd: &Path, cdn_base: impl Into<String>) -> Self {
        Self {
            cdn_base: cdn_base.into(),
            versions: VersionResolver::new(cwd),
        }
    }

    /// New specifier for `specifier`, or `None` when it is not bare.
    pub fn rewrite(&self, specifier: &str) -> Result<Option<String>, Error> {
        let Some((package, subpath)) = bare_specifier(specifier) else {
            return Ok(None);
        };
        let version = self.versions.version_suffix(package)?;
        Ok(Some(cdn_url(&self.cdn_base, package, &version, subpath)))
    }

    /// Import source for the automatic JSX runtime: `<cdn>/react<@version>`.
    pub fn jsx_import_source(&self) -> Result<String, Error> {
        let version = self.versions.version_suffix("react")?;
        Ok(cdn_url(&self.cdn_base, "react", &version, ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_bare_specifier_shapes() {
        assert_eq!(bare_specifier("react"), Some(("react", "")));
        assert_eq!(bare_specifier("react-dom/client"), Some(("react-dom", "/client")));
        assert_eq!(
            bare_specifier("lodash/fp/debounce"),
            Some(("lodash", "/fp/debounce"))
        );
        assert_eq!(bare_specifier("./App"), None);
        assert_eq!(bare_specifier("../lib/util"), None);
        assert_eq!(bare_specifier("/src/App.tsx"), None);
        assert_eq!(bare_specifier("@scope/pkg"), None);
        assert_eq!(bare_specifier("https://esm.sh/react"), None);
        assert_eq!(bare_specifier("lodash.debounce"), None);
        assert_eq!(bare_specifier("react/"), None);
    }

    #[test]
    fn test_cdn_url_with_version_and_subpath() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"dependencies": {"lodash": "^4.17.0"}}"#,
        )
        .unwrap();

        let rewriter = CdnRewriter::new(temp.path(), "https://esm.sh");
        assert_eq!(
            rewriter.rewrite("lodash/debounce").unwrap().as_deref(),
            Some("https://esm.sh/lodash@^4.17.0/debounce")
        );
        assert_eq!(
            rewriter.rewrite("undeclared").unwrap().as_deref(),
            Some("https://esm.sh/undeclared")
        );
        assert_eq!(rewriter.rewrite("./local").unwrap(), None);
    }

    #[test]
    fn test_jsx_import_source_uses_react_version() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"dependencies": {"react": "19.0.0"}}"#,
        )
        .unwrap();

        let rewriter = CdnRewriter::new(temp.path(), "https://cdn.test");
        assert_eq!(
            rewriter.jsx_import_source().unwrap(),
            "https://cdn.test/react@19.0.0"
        );
    }

    #[test]
    fn test_non_bare_specifier_skips_manifest() {
        let temp = TempDir::new().unwrap();
        let rewriter = CdnRewriter::new(temp.path(), "https://esm.sh");
        assert_eq!(rewriter.rewrite("./App").unwrap(), None);
        assert!(rewriter.rewrite("react").is_err());
    }
}
