//! Server component rendering.
//!
//! Every render gets a fresh [`KilnRuntime`] on its own thread: modules are
//! re-evaluated per request and concurrent renders share nothing. The
//! renderer's output arrives as a stream of byte chunks.
//!
//! A render's runtime is dropped as soon as its output is over: when the
//! renderer ends the stream, when the client goes away, or when the event
//! loop drains. Timers the project's modules leave behind die with it.

use crate::runtime::{KilnRuntime, RuntimeError, RuntimeOptions};
use bytes::Bytes;
use deno_core::ModuleSpecifier;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Which export of which module to render, with what props.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Resolved module file.
    pub entry: PathBuf,
    /// Export to invoke; `default` is the fallback when it is missing.
    pub export: String,
    /// Props object, passed through as strings.
    pub props: BTreeMap<String, String>,
}

impl RenderRequest {
    pub fn new(entry: impl Into<PathBuf>, export: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            export: export.into(),
            props: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_props(mut self, props: BTreeMap<String, String>) -> Self {
        self.props = props;
        self
    }
}

/// Chunks written by the renderer. Ends when the renderer ends its
/// destination or the render thread finishes.
#[derive(Debug)]
pub struct RenderStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl RenderStream {
    /// Next chunk, or `None` once the render is over.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Wait for the whole output.
    pub async fn collect(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

/// Renders component exports through the configured flight renderer.
#[derive(Debug, Clone)]
pub struct ComponentRenderer {
    options: RuntimeOptions,
    active: Arc<AtomicUsize>,
}

/// Counts a render thread for as long as it lives.
struct ActiveRender(Arc<AtomicUsize>);

impl ActiveRender {
    fn start(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for ActiveRender {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ComponentRenderer {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            options,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Render threads still alive, across clones of this renderer.
    #[must_use]
    pub fn active_renders(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a render. Resolves once the entry module and the renderer are
    /// loaded and the component has been invoked; output keeps streaming
    /// after that.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderStream, RuntimeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let options = self.options.clone();
        let active = ActiveRender::start(&self.active);

        // JsRuntime is !Send; give it a thread and a runtime of its own.
        std::thread::Builder::new()
            .name("kiln-render".to_string())
            .spawn(move || {
                let _active = active;
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(RuntimeError::Init(format!(
                            "Failed to create render runtime: {e}"
                        ))));
                        return;
                    }
                };
                rt.block_on(run_render(options, request, tx, ready_tx));
            })
            .map_err(|e| RuntimeError::Io(format!("Failed to spawn render thread: {e}")))?;

        ready_rx
            .await
            .map_err(|_| RuntimeError::Render("render thread exited before setup".to_string()))??;

        Ok(RenderStream { rx })
    }
}

async fn run_render(
    options: RuntimeOptions,
    request: RenderRequest,
    tx: mpsc::UnboundedSender<Bytes>,
    ready: oneshot::Sender<Result<(), RuntimeError>>,
) {
    let entry = request.entry.display().to_string();
    let setup = async {
        let specifier = ModuleSpecifier::from_file_path(options.cwd.join("__kiln_render__.js"))
            .map_err(|()| {
                RuntimeError::Io(format!("Invalid project root: {}", options.cwd.display()))
            })?;
        let code = driver_module(&request)?;
        let mut runtime = KilnRuntime::new(options)?;
        let closed = runtime.set_sink(tx.clone());
        runtime.execute_module_code(&specifier, code).await?;
        Ok::<_, RuntimeError>((runtime, closed))
    };

    let (mut runtime, closed) = match setup.await {
        Ok(setup) => {
            let _ = ready.send(Ok(()));
            setup
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    tokio::select! {
        result = runtime.run_event_loop() => match result {
            Ok(()) => debug!(entry = %entry, "render finished"),
            Err(e) => error!(entry = %entry, error = %e, "render failed after streaming started"),
        },
        () = closed.notified() => debug!(entry = %entry, "render output ended"),
        () = tx.closed() => debug!(entry = %entry, "render client went away"),
    }
    drop(runtime);
}

/// Module that imports the entry and pipes the component's result into
/// the sink.
fn driver_module(request: &RenderRequest) -> Result<String, RuntimeError> {
    let entry_url = ModuleSpecifier::from_file_path(&request.entry)
        .map_err(|()| RuntimeError::Io(format!("Invalid path: {}", request.entry.display())))?;
    let job = serde_json::json!({
        "export": request.export,
        "props": request.props,
    });
    let entry_literal = serde_json::Value::String(entry_url.to_string());
    let job_literal = serde_json::Value::String(job.to_string());

    Ok(format!(
        r#"import * as entry from {entry_literal};
const kiln = globalThis.__kiln;
const job = JSON.parse({job_literal});
const component = entry[job.export] ?? entry.default;
if (typeof component !== "function") {{
  throw new TypeError("Export " + JSON.stringify(job.export) + " of " + {entry_literal} + " is not a function");
}}
const {{ renderToPipeableStream }} = kiln.renderer();
const model = component(job.props);
renderToPipeableStream(model, kiln.createManifest(), {{ onError: kiln.reportError }}).pipe(
  kiln.createSink(),
);
"#
    ))
}
