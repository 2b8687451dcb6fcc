//! Request-time module serving for the zero-build dev server.
//!
//! Source files are transpiled on every request; nothing is cached across
//! requests. The same file goes through one of two pipelines depending on
//! who consumes it:
//! - [`Target::Browser`]: shim injected, bare imports pointed at the CDN,
//!   inline source map.
//! - [`Target::InProcess`]: plain ESM for the embedded runtime, directive
//!   hoisted to the first characters.

pub mod browser;
pub mod directive;
pub mod manifest;
pub mod rewrite;

pub use browser::{BrowserTransformer, WEBPACK_REQUIRE_SHIM};
pub use directive::{hoist_directive, Directive};
pub use manifest::{client_reference, ClientReferenceMetadata};
pub use rewrite::{bare_specifier, cdn_url, CdnRewriter};

use crate::compiler::{SourceMapKind, TranspileSpec};
use std::path::Path;

/// Consumer of a transpiled module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Served over HTTP and executed by the browser.
    Browser,
    /// Executed inside the server's own JavaScript runtime.
    InProcess,
}

impl Target {
    /// Compiler options for this target.
    #[must_use]
    pub fn transpile_spec(self, path: &Path, jsx_import_source: impl Into<String>) -> TranspileSpec {
        let spec = TranspileSpec::new(path).with_jsx_import_source(jsx_import_source);
        match self {
            Self::Browser => spec
                .with_sourcemaps(SourceMapKind::Inline)
                .with_inject(WEBPACK_REQUIRE_SHIM),
            Self::InProcess => spec,
        }
    }
}
