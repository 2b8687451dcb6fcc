use crate::compiler::CompilerError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for kiln operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No candidate suffix resolved to an existing file.
    #[error("File not found: {name}")]
    FileNotFound { name: String },

    /// Malformed source or a failure inside the compiler backend.
    #[error("Failed to transform {path}: {source}")]
    Transform {
        path: PathBuf,
        #[source]
        source: CompilerError,
    },

    /// The entry page or a static asset could not be stat'ed or read.
    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `package.json` missing or malformed when a version lookup happened.
    #[error("Failed to read dependency manifest at {path}: {reason}")]
    ManifestRead { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means "the requested thing does not exist".
    ///
    /// The router maps this to `404`; everything else is a `500`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }

    #[must_use]
    pub fn transform(path: impl Into<PathBuf>, source: CompilerError) -> Self {
        Self::Transform {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = Error::FileNotFound {
            name: "/missing".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "File not found: /missing");

        let err = Error::ManifestRead {
            path: PathBuf::from("package.json"),
            reason: "missing".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transform_error_display() {
        let err = Error::transform("src/App.tsx", CompilerError::parse_error("Unexpected token"));
        let display = err.to_string();
        assert!(display.contains("src/App.tsx"));
        assert!(display.contains("COMPILER_PARSE_ERROR"));
    }
}
