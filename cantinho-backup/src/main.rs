//! Cantinho Backup - Main entry point
//!
//! Serves the backup HTTP API, or runs a single backup/restore from the terminal.

use anyhow::Result;
use cantinho_backup::{api, config::Config, daemon::shutdown::ShutdownCoordinator, utils};
use cantinho_backup::{BackupOrchestrator, UploadedArtifact};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Dump the database into a file
    Backup {
        /// Where to write the plain-text SQL dump
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Restore the database from a `.sql` script or a binary archive
    Restore {
        /// Backup file to apply
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let orchestrator = BackupOrchestrator::new(&config);

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, orchestrator, port).await,
        Command::Backup { output } => {
            let artifact = orchestrator.produce_backup().await?;
            let name = artifact.name().to_string();
            let bytes = artifact.save_to(&output).await?;
            tracing::info!(artifact = %name, bytes, output = %output.display(), "Backup written");
            Ok(())
        }
        Command::Restore { file } => {
            let content = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            orchestrator
                .apply_backup(UploadedArtifact::new(file_name, content))
                .await?;
            tracing::info!(file = %file.display(), "Restore finished");
            Ok(())
        }
    }
}

async fn serve(config: Config, orchestrator: BackupOrchestrator, port: Option<u16>) -> Result<()> {
    // Initialize start time for uptime tracking
    api::health::init_start_time();

    tracing::info!(
        "Starting cantinho-backup v{} (temp dir: {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.scratch_dir().display()
    );

    let port = port.unwrap_or(config.server.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let state = api::create_app_state(orchestrator, config.server.max_upload_mb);
    let tracker = state.job_tracker.clone();
    let app = api::create_router(state);

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Backup download: GET http://{}/api/admin/backup/download", addr);
    tracing::info!("Backup restore: POST http://{}/api/admin/backup/restore", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Create shutdown coordinator
    let shutdown_coordinator = ShutdownCoordinator::new();
    let mut shutdown_rx = shutdown_coordinator.subscribe();

    // Spawn server task
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_rx.recv().await.ok();
    });
    let server_handle = tokio::spawn(async move { server.await });

    // Wait for shutdown signal, then let running operations finish
    shutdown_coordinator.wait_for_signal().await;
    shutdown_coordinator.drain(&tracker).await;

    match tokio::time::timeout(Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Server shutdown complete"),
        Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("Server task panicked: {}", e),
        Err(_) => tracing::warn!("Server shutdown timeout, forcing exit"),
    }

    tracing::info!("Server stopped");

    Ok(())
}
