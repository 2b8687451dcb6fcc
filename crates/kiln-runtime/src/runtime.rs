//! Runtime implementation using deno_core.

use crate::module_loader::KilnModuleLoader;
use crate::ops::{
    op_kiln_client_reference, op_kiln_decode_utf8, op_kiln_encode_utf8, op_kiln_log,
    op_kiln_require_load, op_kiln_require_resolve, op_kiln_sleep, op_kiln_stream_end,
    op_kiln_stream_write, ProjectRoot, RenderSink,
};
use bytes::Bytes;
use deno_core::{extension, v8, JsRuntime, ModuleSpecifier, RuntimeOptions as DenoRuntimeOptions};
use kiln_core::config::DEFAULT_RENDERER;
use kiln_core::{DevModuleHost, ModuleHost};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

/// Runtime error.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Runtime initialization failed: {0}")]
    Init(String),

    #[error("Render failed: {0}")]
    Render(String),
}

/// Runtime configuration options.
#[derive(Clone)]
pub struct RuntimeOptions {
    /// Project root. Module resolution and manifest ids are relative to it.
    pub cwd: PathBuf,
    /// Specifier of the flight renderer, resolved from `cwd`.
    pub renderer: String,
    /// Resolve/compile hooks. Defaults to [`DevModuleHost`] on `cwd`.
    pub host: Option<Arc<dyn ModuleHost>>,
}

impl RuntimeOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            renderer: DEFAULT_RENDERER.to_string(),
            host: None,
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Into<String>) -> Self {
        self.renderer = renderer.into();
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn ModuleHost>) -> Self {
        self.host = Some(host);
        self
    }
}

impl std::fmt::Debug for RuntimeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeOptions")
            .field("cwd", &self.cwd)
            .field("renderer", &self.renderer)
            .field("custom_host", &self.host.is_some())
            .finish()
    }
}

extension!(
    kiln_runtime,
    ops = [
        op_kiln_log,
        op_kiln_encode_utf8,
        op_kiln_decode_utf8,
        op_kiln_sleep,
        op_kiln_require_resolve,
        op_kiln_require_load,
        op_kiln_client_reference,
        op_kiln_stream_write,
        op_kiln_stream_end,
    ],
);

/// Bootstrap JavaScript code to set up globals like console, process, etc.
const BOOTSTRAP_JS: &str = include_str!("bootstrap.js");

/// The kiln JavaScript runtime.
///
/// `!Send`: build it on the thread that drives it.
pub struct KilnRuntime {
    js_runtime: JsRuntime,
    cwd: PathBuf,
}

impl KilnRuntime {
    /// Create a new runtime. The module loader is installed here, before
    /// any module can load.
    pub fn new(options: RuntimeOptions) -> Result<Self, RuntimeError> {
        let RuntimeOptions {
            cwd,
            renderer,
            host,
        } = options;
        let host = host.unwrap_or_else(|| Arc::new(DevModuleHost::new(&cwd)));
        let module_loader = Rc::new(KilnModuleLoader::new(cwd.clone(), host));

        let mut js_runtime = JsRuntime::new(DenoRuntimeOptions {
            extensions: vec![kiln_runtime::init_ops()],
            module_loader: Some(module_loader.clone()),
            ..Default::default()
        });

        {
            let op_state = js_runtime.op_state();
            let mut op_state = op_state.borrow_mut();
            op_state.put(module_loader);
            op_state.put(ProjectRoot(cwd.clone()));
        }

        js_runtime
            .execute_script("<kiln:bootstrap>", BOOTSTRAP_JS.to_string())
            .map_err(|e| RuntimeError::Init(format!("Bootstrap failed: {e}")))?;

        let settings = serde_json::json!({
            "cwd": cwd.to_string_lossy(),
            "renderer": renderer,
        });
        js_runtime
            .execute_script("<kiln:configure>", format!("globalThis.__kiln.configure({settings});"))
            .map_err(|e| RuntimeError::Init(format!("Configuration failed: {e}")))?;

        Ok(Self { js_runtime, cwd })
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Route bytes written by the render sink into `tx`.
    ///
    /// The returned handle is notified when the sink is closed.
    pub fn set_sink(&mut self, tx: UnboundedSender<Bytes>) -> Rc<Notify> {
        let closed = Rc::new(Notify::new());
        self.js_runtime
            .op_state()
            .borrow_mut()
            .put(RenderSink::new(tx, Rc::clone(&closed)));
        closed
    }

    /// Execute a script (non-module code).
    pub async fn execute_script(&mut self, code: &str) -> Result<(), RuntimeError> {
        self.js_runtime
            .execute_script("<kiln>", code.to_string())
            .map_err(|e| RuntimeError::JavaScript(e.to_string()))?;
        Ok(())
    }

    /// Evaluate an expression and stringify its value.
    pub fn eval_to_string(&mut self, code: &str) -> Result<String, RuntimeError> {
        let value = self
            .js_runtime
            .execute_script("<kiln:eval>", code.to_string())
            .map_err(|e| RuntimeError::JavaScript(e.to_string()))?;
        let scope = &mut self.js_runtime.handle_scope();
        let local = v8::Local::new(scope, value);
        Ok(local.to_rust_string_lossy(scope))
    }

    /// Execute an ES module from a file path.
    pub async fn execute_module(&mut self, path: &Path) -> Result<(), RuntimeError> {
        let specifier = ModuleSpecifier::from_file_path(path)
            .map_err(|()| RuntimeError::Io(format!("Invalid path: {}", path.display())))?;

        let module_id = self
            .js_runtime
            .load_main_es_module(&specifier)
            .await
            .map_err(|e| RuntimeError::JavaScript(format!("Failed to load module: {e}")))?;

        self.evaluate(module_id).await
    }

    /// Execute ES module source under `specifier`. Imports resolve relative
    /// to the specifier's directory.
    pub async fn execute_module_code(
        &mut self,
        specifier: &ModuleSpecifier,
        code: String,
    ) -> Result<(), RuntimeError> {
        let module_id = self
            .js_runtime
            .load_side_es_module_from_code(specifier, code)
            .await
            .map_err(|e| RuntimeError::JavaScript(format!("Failed to load module: {e}")))?;

        self.evaluate(module_id).await
    }

    async fn evaluate(&mut self, module_id: deno_core::ModuleId) -> Result<(), RuntimeError> {
        // mod_evaluate returns a receiver - we need to run the event loop
        // while waiting for the module to complete
        let mut receiver = self.js_runtime.mod_evaluate(module_id);

        loop {
            tokio::select! {
                biased;

                maybe_result = &mut receiver => {
                    return maybe_result.map_err(|e| {
                        RuntimeError::JavaScript(format!("Module evaluation failed: {e}"))
                    });
                }

                event_loop_result = self.js_runtime.run_event_loop(Default::default()) => {
                    event_loop_result
                        .map_err(|e| RuntimeError::JavaScript(format!("Event loop error: {e}")))?;
                }
            }
        }
    }

    /// Run the event loop until completion.
    pub async fn run_event_loop(&mut self) -> Result<(), RuntimeError> {
        self.js_runtime
            .run_event_loop(Default::default())
            .await
            .map_err(|e| RuntimeError::JavaScript(e.to_string()))?;
        Ok(())
    }
}
