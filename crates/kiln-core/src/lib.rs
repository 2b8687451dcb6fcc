#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod compiler;
pub mod config;
pub mod dev;
pub mod error;
pub mod loader;
pub mod resolve;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use loader::{CompiledModule, DevModuleHost, Directive, ModuleHost};
pub use resolve::{has_source_extension, resolve_file, SOURCE_EXTENSIONS};
pub use version::VersionResolver;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
