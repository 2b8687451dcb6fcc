//! Browser module transformation.
//!
//! Handles: read → parse → append shim → CDN import rewrite → strip types /
//! JSX → emit with inline source map. Runs from scratch on every request.

use super::rewrite::CdnRewriter;
use super::Target;
use crate::compiler::{CompilerBackend, CompilerError, SwcBackend};
use crate::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Stands in for the bundler runtime's module loader in the browser.
///
/// The streaming client calls `__webpack_require__(id)` for every client
/// reference; a native dynamic import of the manifest `id` satisfies it.
pub const WEBPACK_REQUIRE_SHIM: &str = r"globalThis.__webpack_require__ = function (id) {
  return import(id);
};
";

/// Turns `.ts`/`.tsx` files into browser-executable ES modules.
#[derive(Clone)]
pub struct BrowserTransformer {
    rewriter: CdnRewriter,
    backend: Arc<dyn CompilerBackend>,
}

impl std::fmt::Debug for BrowserTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserTransformer")
            .field("rewriter", &self.rewriter)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl BrowserTransformer {
    /// Transformer backed by SWC.
    #[must_use]
    pub fn new(cwd: &Path, cdn_base: impl Into<String>) -> Self {
        Self::with_backend(cwd, cdn_base, Arc::new(SwcBackend::new()))
    }

    #[must_use]
    pub fn with_backend(
        cwd: &Path,
        cdn_base: impl Into<String>,
        backend: Arc<dyn CompilerBackend>,
    ) -> Self {
        Self {
            rewriter: CdnRewriter::new(cwd, cdn_base),
            backend,
        }
    }

    /// Read and transform the file at `path`.
    pub fn transform_file(&self, path: &Path) -> Result<String, Error> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        self.transform(path, &source)
    }

    /// Transform `source`, treating it as the contents of `path`.
    pub fn transform(&self, path: &Path, source: &str) -> Result<String, Error> {
        let import_source = self.rewriter.jsx_import_source()?;
        let spec = Target::Browser.transpile_spec(path, import_source);

        // Version lookups can fail mid-transform; keep the typed error so it
        // is reported as a manifest failure rather than a compile failure.
        let mut rewrite_failure: Option<Error> = None;
        let result = self.backend.transpile_with(&spec, source, &mut |specifier| {
            match self.rewriter.rewrite(specifier) {
                Ok(rewritten) => {
                    if let Some(url) = &rewritten {
                        debug!(from = specifier, to = %url, "rewrote import");
                    }
                    Ok(rewritten)
                }
                Err(err) => {
                    let message = err.to_string();
                    rewrite_failure = Some(err);
                    Err(CompilerError::rewrite_error(message))
                }
            }
        });

        match result {
            Ok(output) => Ok(output.code),
            Err(err) => Err(rewrite_failure.unwrap_or_else(|| Error::transform(path, err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(deps: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("package.json"),
            format!(r#"{{"dependencies": {deps}}}"#),
        )
        .unwrap();
        temp
    }

    #[test]
    fn test_bare_imports_point_at_cdn() {
        let temp = project(r#"{"lodash": "^4.17.0", "react": "19.0.0"}"#);
        let file = temp.path().join("app.ts");
        fs::write(
            &file,
            r#"import debounce from "lodash/debounce";
import { helper } from "./helper";
import remote from "https://example.com/mod.js";
console.log(debounce, helper, remote);
"#,
        )
        .unwrap();

        let transformer = BrowserTransformer::new(temp.path(), "https://esm.sh");
        let code = transformer.transform_file(&file).unwrap();

        assert!(code.contains("\"https://esm.sh/lodash@^4.17.0/debounce\""));
        assert!(code.contains("\"./helper\""));
        assert!(code.contains("\"https://example.com/mod.js\""));
    }

    #[test]
    fn test_shim_appended_once_after_original_statements() {
        let temp = project("{}");
        let file = temp.path().join("page.ts");
        fs::write(&file, "export const last = \"marker\";\n").unwrap();

        let transformer = BrowserTransformer::new(temp.path(), "https://esm.sh");
        for _ in 0..2 {
            let code = transformer.transform_file(&file).unwrap();
            let marker = code.find("\"marker\"").unwrap();
            let shim = code.find("globalThis.__webpack_require__").unwrap();
            assert!(shim > marker);
            assert_eq!(code.matches("__webpack_require__").count(), 1);
        }
    }

    #[test]
    fn test_tsx_uses_cdn_jsx_runtime_and_inline_map() {
        let temp = project(r#"{"react": "19.0.0"}"#);
        let file = temp.path().join("Hello.tsx");
        fs::write(
            &file,
            "export default function Hello({ name }: { name: string }) {\n  return <p>{name}</p>;\n}\n",
        )
        .unwrap();

        let transformer = BrowserTransformer::new(temp.path(), "https://esm.sh");
        let code = transformer.transform_file(&file).unwrap();

        assert!(code.contains("https://esm.sh/react@19.0.0/jsx-runtime"));
        assert!(code.contains("//# sourceMappingURL=data:application/json;base64,"));
        assert!(!code.contains("<p>"));
    }

    #[test]
    fn test_missing_manifest_is_manifest_error() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.ts");
        fs::write(&file, "export const a = 1;\n").unwrap();

        let transformer = BrowserTransformer::new(temp.path(), "https://esm.sh");
        let err = transformer.transform_file(&file).unwrap_err();
        assert!(matches!(err, Error::ManifestRead { .. }));
    }

    #[test]
    fn test_parse_failure_is_transform_error() {
        let temp = project("{}");
        let file = temp.path().join("broken.ts");
        fs::write(&file, "export const = ;").unwrap();

        let transformer = BrowserTransformer::new(temp.path(), "https://esm.sh");
        let err = transformer.transform_file(&file).unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_unreadable_file_is_stat_error() {
        let temp = project("{}");
        let transformer = BrowserTransformer::new(temp.path(), "https://esm.sh");
        let err = transformer
            .transform_file(&temp.path().join("gone.ts"))
            .unwrap_err();
        assert!(matches!(err, Error::Stat { .. }));
    }
}
