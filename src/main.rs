use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use hark::{
    create_router, default_platform, AppState, Config, DeviceResolver, NatsClient,
    ProcessCaptureFactory, SessionController,
};

#[derive(Debug, Parser)]
#[command(name = "hark", about = "Meeting audio capture service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/hark")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("hark v0.1.0");
    info!("Loaded config: {}", cfg.service.name);

    // Platform strategy is selected once here and injected everywhere.
    let platform = default_platform(cfg.recorder.binary.clone());
    let resolver = DeviceResolver::new(Arc::clone(&platform));
    let factory = Arc::new(ProcessCaptureFactory::new(platform));
    let controller = Arc::new(SessionController::new(
        cfg.session_config(),
        resolver,
        factory,
    ));

    // Optional live-transcription relay; NATS being down never blocks
    // recording.
    if let Some(nats) = &cfg.nats {
        match NatsClient::connect(&nats.url).await {
            Ok(client) => {
                hark::spawn_relay(client, controller.events());
            }
            Err(e) => warn!("NATS unavailable, live chunk relay disabled: {}", e),
        }
    }

    let bind = args.bind.unwrap_or(cfg.service.http.bind);
    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", bind, port);

    let app = create_router(AppState::new(Arc::clone(&controller)));

    info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Stop any in-flight session before exiting; stop() is idempotent,
    // so racing an HTTP-initiated stop here is fine.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received; stopping active session");
            if let Err(e) = controller.stop().await {
                warn!("Session cleanup on shutdown failed: {}", e);
            }
        })
        .await?;

    Ok(())
}
