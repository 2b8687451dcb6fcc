//! Module host: the resolve/compile pair behind in-process module loading.
//!
//! The embedded runtime never touches the file system or the compiler on its
//! own. Its module loader asks a [`ModuleHost`] to map specifiers to files
//! and to turn source into executable ESM, so tests can swap in a fake.

use crate::compiler::{CompilerBackend, SwcBackend, DEFAULT_JSX_IMPORT_SOURCE};
use crate::dev::{hoist_directive, Target};
use crate::error::Error;
use crate::resolve::{probe_candidates, resolve_file};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use crate::dev::Directive;

/// Executable module produced by a [`ModuleHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    /// ES module text. Starts with the directive statement when there is one.
    pub code: String,
    pub directive: Directive,
    /// Top-level export names, `default` included.
    pub exports: Vec<String>,
}

/// Resolver and compiler used by the in-process module loader.
pub trait ModuleHost: Send + Sync {
    /// File a specifier refers to, or `None` to fall through to default
    /// resolution.
    fn resolve(&self, specifier: &str) -> Option<PathBuf>;

    /// Compile `source` (the contents of `path`) for in-process execution.
    fn compile(&self, path: &Path, source: &str) -> Result<CompiledModule, Error>;
}

/// Default host: extensionless resolution under the project root and SWC
/// compilation with directive hoisting.
#[derive(Clone)]
pub struct DevModuleHost {
    cwd: PathBuf,
    backend: Arc<dyn CompilerBackend>,
}

impl std::fmt::Debug for DevModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevModuleHost")
            .field("cwd", &self.cwd)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl DevModuleHost {
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self::with_backend(cwd, Arc::new(SwcBackend::new()))
    }

    #[must_use]
    pub fn with_backend(cwd: impl Into<PathBuf>, backend: Arc<dyn CompilerBackend>) -> Self {
        Self {
            cwd: cwd.into(),
            backend,
        }
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

impl ModuleHost for DevModuleHost {
    fn resolve(&self, specifier: &str) -> Option<PathBuf> {
        if let Some(path) = specifier.strip_prefix("file://") {
            return probe_candidates(Path::new(path));
        }
        if Path::new(specifier).is_absolute() {
            return probe_candidates(Path::new(specifier));
        }
        resolve_file(&self.cwd, specifier).ok()
    }

    fn compile(&self, path: &Path, source: &str) -> Result<CompiledModule, Error> {
        let spec = Target::InProcess.transpile_spec(path, DEFAULT_JSX_IMPORT_SOURCE);
        let output = self
            .backend
            .transpile(&spec, source)
            .map_err(|e| Error::transform(path, e))?;
        let (code, directive) = hoist_directive(output.code);
        Ok(CompiledModule {
            code,
            directive,
            exports: output.exports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilerError, ImportRewriter, TranspileOutput, TranspileSpec};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_extensionless_under_cwd() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("lib")).unwrap();
        fs::write(temp.path().join("lib/db.ts"), "export const db = 1;").unwrap();

        let host = DevModuleHost::new(temp.path());
        assert_eq!(host.resolve("lib/db"), Some(temp.path().join("lib/db.ts")));
        assert_eq!(host.resolve("/lib/db"), Some(temp.path().join("lib/db.ts")));
        assert_eq!(host.resolve("react"), None);
    }

    #[test]
    fn test_resolve_file_url_and_absolute_path() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("Page.tsx"), "").unwrap();
        let host = DevModuleHost::new("/somewhere/else");

        let base = temp.path().join("Page");
        let url = format!("file://{}", base.display());
        assert_eq!(host.resolve(&url), Some(temp.path().join("Page.tsx")));
        assert_eq!(
            host.resolve(&base.display().to_string()),
            Some(temp.path().join("Page.tsx"))
        );
    }

    #[test]
    fn test_compile_keeps_use_client_first() {
        let host = DevModuleHost::new("/project");
        let source = "\"use client\";\nimport { useState } from \"react\";\nexport default function Counter() {\n  const [n] = useState(0);\n  return <b>{n}</b>;\n}\n";
        let compiled = host.compile(Path::new("/project/Counter.tsx"), source).unwrap();

        assert!(compiled.code.starts_with("\"use client\";"));
        assert_eq!(compiled.directive, Directive::UseClient);
        assert_eq!(compiled.exports, vec!["default"]);
        assert!(compiled.code.contains("react/jsx-runtime"));
    }

    #[test]
    fn test_compile_use_server_exports() {
        let host = DevModuleHost::new("/project");
        let source = "\"use server\";\nexport async function save(data: string) {\n  return data;\n}\nexport const label = \"x\";\n";
        let compiled = host.compile(Path::new("/project/actions.ts"), source).unwrap();

        assert!(compiled.code.starts_with("\"use server\";"));
        assert_eq!(compiled.directive, Directive::UseServer);
        assert_eq!(compiled.exports, vec!["save", "label"]);
    }

    #[test]
    fn test_compile_error_is_transform() {
        let host = DevModuleHost::new("/project");
        let err = host
            .compile(Path::new("/project/bad.ts"), "let = ;")
            .unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
    }

    struct FixedBackend;

    impl CompilerBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn transpile_with(
            &self,
            _spec: &TranspileSpec,
            _source: &str,
            _rewrite: &mut ImportRewriter<'_>,
        ) -> Result<TranspileOutput, CompilerError> {
            Ok(TranspileOutput::new("import x from \"y\";\n\"use server\";\n")
                .with_exports(vec!["default".to_string()]))
        }
    }

    #[test]
    fn test_backend_is_swappable_and_directive_hoisted() {
        let host = DevModuleHost::with_backend("/project", Arc::new(FixedBackend));
        let compiled = host.compile(Path::new("/project/a.ts"), "ignored").unwrap();
        assert!(compiled.code.starts_with("\"use server\";\nimport x"));
        assert_eq!(compiled.directive, Directive::UseServer);
    }
}
