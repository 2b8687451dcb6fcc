//! Embedded JavaScript runtime for kiln.
//!
//! Uses deno_core (V8) to load project modules in-process and render server
//! components without a Node.js subprocess.
//!
//! ## Usage
//!
//! ```ignore
//! use kiln_runtime::{ComponentRenderer, RenderRequest, RuntimeOptions};
//!
//! let renderer = ComponentRenderer::new(RuntimeOptions::new("/project"));
//! let stream = renderer
//!     .render(RenderRequest::new("/project/page.tsx", "default"))
//!     .await?;
//! ```

mod module_loader;
mod ops;
mod render;
mod runtime;

pub use module_loader::{builtin_name, module_format, KilnModuleLoader, ModuleFormat, NodeResolver, ResolutionMode};
pub use render::{ComponentRenderer, RenderRequest, RenderStream};
pub use runtime::{KilnRuntime, RuntimeError, RuntimeOptions};
