//! Options and output of one compiler run.
//!
//! The dev server compiles the same file two ways (see
//! [`crate::dev::Target`]); both are expressed as a [`TranspileSpec`].

use std::path::PathBuf;

/// JSX import source used when none is given.
pub const DEFAULT_JSX_IMPORT_SOURCE: &str = "react";

/// Whether to emit a source map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMapKind {
    #[default]
    None,
    /// Appended to the code as a base64 `data:` URL and also returned in
    /// [`TranspileOutput::source_map`].
    Inline,
}

/// Options for compiling one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileSpec {
    /// Source file; `.ts`/`.tsx` select TypeScript, `.tsx`/`.jsx` enable JSX.
    pub input_path: PathBuf,
    /// Where the automatic JSX runtime imports `jsx-runtime` from.
    pub jsx_import_source: String,
    pub sourcemaps: SourceMapKind,
    /// Source whose top-level statements are appended after the module's own.
    pub inject: Option<String>,
}

impl TranspileSpec {
    #[must_use]
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            jsx_import_source: DEFAULT_JSX_IMPORT_SOURCE.to_string(),
            sourcemaps: SourceMapKind::None,
            inject: None,
        }
    }

    #[must_use]
    pub fn with_jsx_import_source(mut self, source: impl Into<String>) -> Self {
        self.jsx_import_source = source.into();
        self
    }

    #[must_use]
    pub fn with_sourcemaps(mut self, sourcemaps: SourceMapKind) -> Self {
        self.sourcemaps = sourcemaps;
        self
    }

    /// Append the top-level statements of `source` to the output.
    #[must_use]
    pub fn with_inject(mut self, source: impl Into<String>) -> Self {
        self.inject = Some(source.into());
        self
    }
}

/// Emitted module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOutput {
    pub code: String,
    /// Source map JSON, when one was requested.
    pub source_map: Option<String>,
    /// Top-level runtime export names in declaration order, `default`
    /// included. Type-only exports are left out.
    pub exports: Vec<String>,
}

impl TranspileOutput {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            source_map: None,
            exports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_source_map(mut self, source_map: impl Into<String>) -> Self {
        self.source_map = Some(source_map.into());
        self
    }

    #[must_use]
    pub fn with_exports(mut self, exports: Vec<String>) -> Self {
        self.exports = exports;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_spec_is_plain() {
        let spec = TranspileSpec::new("src/App.tsx");
        assert_eq!(spec.jsx_import_source, "react");
        assert_eq!(spec.sourcemaps, SourceMapKind::None);
        assert!(spec.inject.is_none());
    }

    #[test]
    fn test_builder_sets_browser_options() {
        let spec = TranspileSpec::new("src/App.tsx")
            .with_jsx_import_source("https://esm.sh/react@19.0.0")
            .with_sourcemaps(SourceMapKind::Inline)
            .with_inject("globalThis.x = 1;");

        assert_eq!(spec.input_path, PathBuf::from("src/App.tsx"));
        assert_eq!(spec.jsx_import_source, "https://esm.sh/react@19.0.0");
        assert_eq!(spec.sourcemaps, SourceMapKind::Inline);
        assert_eq!(spec.inject.as_deref(), Some("globalThis.x = 1;"));
    }
}
