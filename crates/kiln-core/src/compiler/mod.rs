//! Compiler backend abstraction for transpilation.
//!
//! The rest of kiln never calls SWC directly; it goes through
//! [`CompilerBackend`] so the backend can be swapped or faked in tests.
//!
//! ## Usage
//!
//! ```ignore
//! use kiln_core::compiler::{CompilerBackend, SwcBackend, TranspileSpec};
//!
//! let backend = SwcBackend::new();
//! let spec = TranspileSpec::new("src/App.tsx");
//! let output = backend.transpile(&spec, &source)?;
//! println!("{}", output.code);
//! ```

pub mod options;
pub mod swc;

pub use options::{SourceMapKind, TranspileOutput, TranspileSpec, DEFAULT_JSX_IMPORT_SOURCE};
pub use swc::SwcBackend;

use std::fmt;

/// Callback deciding the new specifier of a top-level import declaration.
///
/// `Ok(None)` leaves the import untouched.
pub type ImportRewriter<'a> = dyn FnMut(&str) -> Result<Option<String>, CompilerError> + 'a;

/// Error during compilation.
#[derive(Debug)]
pub struct CompilerError {
    /// Error code.
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
}

impl CompilerError {
    /// Create a new compiler error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new("COMPILER_PARSE_ERROR", message)
    }

    /// Create a transform error.
    #[must_use]
    pub fn transform_error(message: impl Into<String>) -> Self {
        Self::new("COMPILER_TRANSFORM_ERROR", message)
    }

    /// An import rewrite callback gave up.
    #[must_use]
    pub fn rewrite_error(message: impl Into<String>) -> Self {
        Self::new("COMPILER_REWRITE_ERROR", message)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CompilerError {}

/// Compiler backend trait for transpilation.
///
/// The trait is `Send + Sync` so one backend can serve concurrent requests.
pub trait CompilerBackend: Send + Sync {
    /// Get the backend name (e.g., "swc").
    fn name(&self) -> &'static str;

    /// Transpile `source`, letting `rewrite` replace top-level import
    /// specifiers before any transform runs.
    fn transpile_with(
        &self,
        spec: &TranspileSpec,
        source: &str,
        rewrite: &mut ImportRewriter<'_>,
    ) -> Result<TranspileOutput, CompilerError>;

    /// Transpile `source` without touching imports.
    fn transpile(&self, spec: &TranspileSpec, source: &str) -> Result<TranspileOutput, CompilerError> {
        self.transpile_with(spec, source, &mut |_| Ok(None))
    }
}
