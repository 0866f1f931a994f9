use anyhow::Context;
use browsercraft::prelude::*;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let config = ServerConfig::parse();
    init_tracing(&config.log_filter());

    let mut accounts = InMemoryAccounts::new();
    if config.dev {
        accounts = accounts.with_user("dev", "dev");
        info!("development mode: demo account dev/dev enabled");
    }

    let server = BrowsercraftServerBuilder::from_config(&config)
        .build::<World>(accounts, InMemorySessions::new())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    info!(
        addr = %server.local_addr()?,
        tick_rate_hz = config.tick_rate_hz,
        max_players = config.max_players_per_lobby,
        "Browsercraft listening"
    );

    server.run_until(shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }
}
