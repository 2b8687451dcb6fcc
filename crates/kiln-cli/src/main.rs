#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod logging;

use clap::Parser;
use kiln_core::config::{DEFAULT_CDN_BASE, DEFAULT_PORT, DEFAULT_RENDERER};
use kiln_core::Config;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about = "Zero-build dev server for React Server Components", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Project root to serve (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// CDN that bare imports are rewritten onto
    #[arg(long, env = "KILN_CDN", default_value = DEFAULT_CDN_BASE)]
    cdn: String,

    /// Package providing the server component renderer
    #[arg(long, default_value = DEFAULT_RENDERER)]
    renderer: String,

    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON formatted logs
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = match cli.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().into_diagnostic()?,
    };
    if !cwd.is_dir() {
        return Err(miette::miette!(
            "project root {} is not a directory",
            cwd.display()
        ));
    }

    let config = Config::new(cwd)
        .with_port(Some(cli.port))
        .with_host(cli.host)
        .with_cdn_base(cli.cdn)
        .with_renderer(cli.renderer)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
    rt.block_on(kiln_cli::run(config))
}
