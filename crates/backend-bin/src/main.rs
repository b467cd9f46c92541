// ============================
// crates/backend-bin/src/main.rs
// ============================
//! Tokio / Axum entry-point for the signaling server.

mod browser;

use anyhow::Context;
use clap::Parser;
use scorched_backend_lib::{
    config::{Overrides, Settings},
    reaper::spawn_reaper,
    registry::Registry,
    ws_router, AppState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// LAN signaling server for Scorched Earth
#[derive(Debug, Parser)]
#[command(name = "scorched-signal", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not open the lobby page in a browser
    #[arg(long)]
    no_browser: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            no_browser: self.no_browser.then_some(true),
        }
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let subscriber = tracing_subscriber::registry().with(filter);
    if settings.log_json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())
        .context("loading configuration")?;
    settings.validate()?;
    init_tracing(&settings);

    let state = Arc::new(AppState::new(settings));
    let registry: Arc<Registry> = Arc::clone(&state.registry);
    let settings = Arc::clone(&state.settings);

    let shutdown = CancellationToken::new();
    let reaper = spawn_reaper(
        Arc::clone(&registry),
        settings.reap_interval(),
        settings.room_ttl(),
        shutdown.child_token(),
    );

    let app = ws_router::create_router(state);
    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, web_root = %settings.web_root.display(), "scorched-signal listening");

    if !settings.no_browser {
        browser::open_browser(&settings.browser_url());
    }

    let graceful = {
        let shutdown = shutdown.clone();
        let registry = Arc::clone(&registry);
        async move {
            shutdown_signal().await;
            shutdown.cancel();
            let closed = registry.close_all_peers();
            tracing::info!(closed, "closed live peers");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .await
        .context("server failed")?;

    shutdown.cancel();
    reaper.await.context("reaper task panicked")?;
    tracing::info!("bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["scorched-signal", "--port", "9000", "--no-browser"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.no_browser, Some(true));
        assert!(overrides.host.is_none());

        let cli = Cli::parse_from(["scorched-signal", "-c", "alt.toml", "--host", "127.0.0.1"]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert_eq!(cli.overrides().no_browser, None);
    }
}
