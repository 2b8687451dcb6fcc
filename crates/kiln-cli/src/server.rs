//! Zero-build dev server.
//!
//! Every request is answered from the project directory as it is on disk
//! right now: nothing is bundled ahead of time and nothing is cached.
//!
//! - `/` → `index.html`
//! - `/<path>?__RSC&__RSC_NAME=<export>&<props>` → server component render
//! - `/<path>` resolving to `.ts`/`.tsx` → browser module (CDN imports, inline map)
//! - anything else → raw bytes

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kiln_core::dev::BrowserTransformer;
use kiln_core::{has_source_extension, resolve_file, Config};
use kiln_runtime::{ComponentRenderer, RenderRequest, RenderStream, RuntimeError, RuntimeOptions};
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Query key that switches a request into render mode.
pub const RSC_PARAM: &str = "__RSC";

/// Query key naming the export to render.
pub const RSC_NAME_PARAM: &str = "__RSC_NAME";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const JS_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";
const FLIGHT_CONTENT_TYPE: &str = "text/x-component";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors a request can end in.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Core(#[from] kiln_core::Error),

    #[error(transparent)]
    Render(#[from] RuntimeError),

    #[error("Transform task failed: {0}")]
    Task(String),
}

impl ServeError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What a request for a resolved file turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Render `export` with `props` through the flight renderer.
    Render {
        export: String,
        props: BTreeMap<String, String>,
    },
    /// Transpile for the browser.
    Module,
    /// Serve bytes as-is.
    Static,
}

/// Pick the mode for `path` given the raw query string.
///
/// Render props follow `URLSearchParams` semantics: form-urlencoded pairs,
/// values stay strings and a later duplicate key wins.
#[must_use]
pub fn request_mode(path: &Path, query: Option<&str>) -> Mode {
    let pairs: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    if pairs.iter().any(|(key, _)| key == RSC_PARAM) {
        let export = pairs
            .iter()
            .find(|(key, _)| key == RSC_NAME_PARAM)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("default")
            .to_string();
        let props = pairs
            .into_iter()
            .filter(|(key, _)| key != RSC_PARAM && key != RSC_NAME_PARAM)
            .collect();
        return Mode::Render { export, props };
    }

    if has_source_extension(path) {
        Mode::Module
    } else {
        Mode::Static
    }
}

/// Shared, immutable server state.
#[derive(Debug)]
pub struct DevServer {
    cwd: PathBuf,
    transformer: BrowserTransformer,
    renderer: ComponentRenderer,
}

impl DevServer {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            cwd: config.cwd.clone(),
            transformer: BrowserTransformer::new(&config.cwd, config.cdn_base.clone()),
            renderer: ComponentRenderer::new(
                RuntimeOptions::new(&config.cwd).with_renderer(config.renderer.clone()),
            ),
        }
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    async fn index(&self) -> Result<Response, ServeError> {
        serve_file(&self.cwd.join("index.html"), HTML_CONTENT_TYPE).await
    }

    async fn handle(&self, uri: &Uri) -> Result<Response, ServeError> {
        let file = resolve_file(&self.cwd, uri.path())?;
        let mode = request_mode(&file, uri.query());
        debug!(path = uri.path(), file = %file.display(), mode = mode.name(), "request");

        match mode {
            Mode::Render { export, props } => {
                let request = RenderRequest::new(file, export).with_props(props);
                let stream = self.renderer.render(request).await?;
                Ok(flight_response(stream))
            }
            Mode::Module => {
                let transformer = self.transformer.clone();
                let code = tokio::task::spawn_blocking(move || transformer.transform_file(&file))
                    .await
                    .map_err(|e| ServeError::Task(e.to_string()))??;
                Ok((
                    [
                        (header::CONTENT_TYPE, JS_CONTENT_TYPE.to_string()),
                        (header::CONTENT_LENGTH, code.len().to_string()),
                    ],
                    code,
                )
                    .into_response())
            }
            Mode::Static => serve_file(&file, BINARY_CONTENT_TYPE).await,
        }
    }
}

impl Mode {
    fn name(&self) -> &'static str {
        match self {
            Self::Render { .. } => "render",
            Self::Module => "module",
            Self::Static => "static",
        }
    }
}

/// Stream a file with its size as `Content-Length`.
async fn serve_file(path: &Path, content_type: &'static str) -> Result<Response, ServeError> {
    let stat_error = |source| kiln_core::Error::Stat {
        path: path.to_path_buf(),
        source,
    };
    let metadata = tokio::fs::metadata(path).await.map_err(stat_error)?;
    let file = tokio::fs::File::open(path).await.map_err(stat_error)?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Body fed by the renderer; it ends when the renderer ends its output.
fn flight_response(stream: RenderStream) -> Response {
    let body = futures::stream::unfold(stream, |mut stream| async move {
        stream
            .recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(chunk), stream))
    });
    ([(header::CONTENT_TYPE, FLIGHT_CONTENT_TYPE)], Body::from_stream(body)).into_response()
}

fn error_response(path: &str, err: &ServeError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        error!(path, error = %err, "request failed");
    } else {
        warn!(path, error = %err, "request failed");
    }
    (status, format!("{err}\n")).into_response()
}

async fn serve_index(State(state): State<Arc<DevServer>>) -> Response {
    match state.index().await {
        Ok(response) => response,
        Err(e) => error_response("/", &e),
    }
}

async fn serve_path(State(state): State<Arc<DevServer>>, uri: Uri) -> Response {
    match state.handle(&uri).await {
        Ok(response) => response,
        Err(e) => error_response(uri.path(), &e),
    }
}

/// The dev server's router.
pub fn app(state: Arc<DevServer>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/*path", get(serve_path))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Socket address for `host`, an IPv4/IPv6 literal or `localhost`.
pub fn bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip = if host == "localhost" {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map_err(|e| miette::miette!("invalid host {host}: {e}"))?
    };
    Ok(SocketAddr::from((ip, port)))
}

/// Bind and serve until the process is stopped.
pub async fn run(config: Config) -> Result<()> {
    let addr = bind_addr(&config.host, config.port)?;

    let state = Arc::new(DevServer::new(&config));
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    info!(cwd = %config.cwd.display(), "dev server running at http://{addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
