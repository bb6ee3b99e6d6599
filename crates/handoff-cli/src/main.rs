mod config;

use clap::{Parser, Subcommand};
use config::HandoffConfig;
use handoff_gateway::{GatewayServer, HttpQueryEngine};
use handoff_session::{FileHistoryArchive, ScriptedHandoff, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "handoff", about = "Live support chat hub with bot/human handoff")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "handoff.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat hub
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate the config file and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = HandoffConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let mut sessions = SessionManager::new(config.hub.max_turns_for_prompt);
            if config.archive.enabled {
                let archive = FileHistoryArchive::new(config.history_dir()).await?;
                info!(dir = %config.history_dir().display(), "History archive enabled");
                sessions = sessions.with_archive(Arc::new(archive));
            }

            let engine = HttpQueryEngine::new(
                config.engine.url.clone(),
                Duration::from_secs(config.engine.timeout_secs),
            )?;
            let handoff = ScriptedHandoff::new(config.handoff.transfer_message.clone());

            let app = GatewayServer::build(
                config.hub.clone(),
                Arc::new(sessions),
                Arc::new(engine),
                Arc::new(handoff),
            );

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(engine = %config.engine.url, "Handoff hub listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Handoff hub stopped");
        }
        Commands::CheckConfig => {
            println!("Config OK: {}", cli.config.display());
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
