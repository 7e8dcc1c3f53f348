use anyhow::{Context, Result};
use clap::Parser;
use geofence_ipc::config::{write_port_file, PortFileContent, ServerConfig};
use geofence_ipc::daemon_log::daemon_log;
use geofence_ipc::engine::MemoryEngine;
use geofence_ipc::geofence_paths;
use geofence_ipc::GeofenceServer;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geofenced")]
#[command(about = "Geofence server backed by an in-memory place and fence store")]
#[command(version)]
struct Cli {
    /// YAML config file (defaults to ~/.geofence/geofenced.yaml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Method listener port (0 picks a free port)
    #[arg(long)]
    port: Option<u16>,

    /// Signal listener port (0 picks a free port)
    #[arg(long)]
    signal_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(signal_port) = cli.signal_port {
        config.signal_port = signal_port;
    }

    let engine = MemoryEngine::new();
    let server = GeofenceServer::create(&config, engine.capabilities())
        .await
        .context("Failed to start geofence server")?;

    let port_path = geofence_paths::port_file_path()?;
    write_port_file(
        &port_path,
        &PortFileContent {
            port: server.local_addr().port(),
            signal_port: server.signal_addr().port(),
        },
    )?;

    eprintln!(
        "geofenced listening on {} (signals on {})",
        server.local_addr(),
        server.signal_addr()
    );
    daemon_log("geofenced", &format!("Port file written to {}", port_path.display()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    daemon_log("geofenced", "Shutting down");
    server.destroy().await?;
    let _ = std::fs::remove_file(&port_path);
    Ok(())
}
