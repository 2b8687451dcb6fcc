use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// CDN serving third-party packages to the browser.
pub const DEFAULT_CDN_BASE: &str = "https://esm.sh";

/// Package providing `renderToPipeableStream` and the reference registrars.
pub const DEFAULT_RENDERER: &str = "react-server-dom-webpack/server";

/// Runtime configuration for the kiln dev server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project root; every URL path and module specifier resolves against it.
    pub cwd: PathBuf,

    /// Listening port.
    pub port: u16,

    /// Bind address.
    pub host: String,

    /// Base URL that bare imports are rewritten onto (no trailing slash).
    pub cdn_base: String,

    /// Module specifier of the component-streaming renderer.
    pub renderer: String,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            port: DEFAULT_PORT,
            host: "127.0.0.1".to_string(),
            cdn_base: DEFAULT_CDN_BASE.to_string(),
            renderer: DEFAULT_RENDERER.to_string(),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set the listening port; `None` keeps the default.
    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port.unwrap_or(DEFAULT_PORT);
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the CDN base URL. A trailing slash is dropped.
    #[must_use]
    pub fn with_cdn_base(mut self, cdn_base: impl Into<String>) -> Self {
        let cdn_base = cdn_base.into();
        self.cdn_base = cdn_base.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Into<String>) -> Self {
        self.renderer = renderer.into();
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}
