use anyhow::Context;
use clap::{Parser, Subcommand};
use relaycast_config::load as load_config;
use relaycast_gateway::{build_router, GatewayState};
use relaycast_hub::Hub;
use relaycast_runtime::telemetry;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "relaycast")]
#[command(about = "Real-time broadcast hub (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => run_server(port).await,
    }
}

async fn run_server(port_override: Option<u16>) -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    info!("starting relaycast");

    let mut config = load_config().context("failed to load configuration")?;
    if let Some(port) = port_override {
        config.http.port = port;
    }

    let (hub, handle) = Hub::with_history_limit(config.hub.message_history);
    tokio::spawn(hub.run());

    let app = build_router(GatewayState::new(handle));

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(relaycast_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("relaycast shut down");
    Ok(())
}
