//! robotremote: serve the example keyword library over the remote interface.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use robotremote::demo::example_library;
use robotremote::service::RemoteService;
use robotremote::transport::{ServerConfig, serve};

#[derive(Debug, Parser)]
#[command(name = "robotremote", version, about = "Robot Framework remote library server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on; 0 picks a free port.
    #[arg(long, default_value_t = 8270)]
    port: u16,

    /// Write the bound port to this file once listening.
    #[arg(long)]
    port_file: Option<PathBuf>,

    /// Refuse remote stop requests.
    #[arg(long)]
    no_stop: bool,

    /// Only capture keyword console output, not the process stdout.
    #[arg(long)]
    no_stdout_capture: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

/// Initialize tracing with ROBOTREMOTE_LOG and LOG_FORMAT support.
fn init_tracing(debug: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("ROBOTREMOTE_LOG").as_deref() {
            _ if debug => "debug",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("robotremote={base_level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        port_file: args.port_file,
        allow_stop: !args.no_stop,
        capture_stdout: !args.no_stdout_capture,
    };
    let service = Arc::new(RemoteService::new(Arc::new(example_library())));

    serve(config, Arc::clone(&service)).await?;

    if let Some(code) = service.state().exit_code() {
        tracing::error!(code, "Exiting after fatal keyword failure");
        std::process::exit(code);
    }
    Ok(())
}
