//! Toolgate IPC server - main entry point.
//!
//! Serves the `tools` service over TCP+msgpack, backed by an in-memory
//! definition store.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use jeeves_toolgate::ipc::IpcServer;
use jeeves_toolgate::{Config, InMemoryToolStore, ToolService};

#[derive(Debug, Parser)]
#[command(name = "toolgate", version, about = "Dynamic HTTP tool execution engine")]
struct Args {
    /// JSON configuration file; defaults apply to anything it omits.
    #[arg(long, env = "TOOLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen.to_string();
    }

    jeeves_toolgate::observability::init_tracing_with(&config.observability);

    let store = Arc::new(InMemoryToolStore::new());
    let service = Arc::new(ToolService::new(store, &config)?);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let server = Arc::new(IpcServer::new(service.clone(), addr, config.ipc.clone()));
    let maintenance = service.start_maintenance(server.cancellation_token());

    tracing::info!(
        "toolgate_starting: addr={} validation_mode={:?} health_concurrency={}",
        addr,
        config.executor.validation_mode,
        config.health.concurrency
    );

    let shutdown = server.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("toolgate_shutdown_requested");
            shutdown.cancel();
        }
    });

    server.serve().await?;
    let _ = maintenance.await;
    Ok(())
}
