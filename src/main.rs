// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request Governor Service
//!
//! Runs the governor in front of the API routes and exposes the admin
//! endpoints for lifting bans.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:3000)
//! - `MAX_REQUESTS`: Requests allowed per window (default: 25)
//! - `WINDOW_MS`: Window length in milliseconds (default: 10000)
//! - `DATA_DIR` / `LOG_DIR`: Ban table and audit log directories
//! - `REAPER_INTERVAL_SECS`: Idle window sweep interval (default: 60)
//! - `ADMIN_KEY`: Secret for `/admin/*`; admin calls are refused when unset

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use request_governor::{
    config::Config,
    handlers::{router, AppState},
    limiter::{spawn_reaper, RateLimiter},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        data_dir = %config.rate_limit.data_dir.display(),
        log_dir = %config.rate_limit.log_dir.display(),
        "Starting request governor"
    );
    if config.admin.secret.is_none() {
        warn!("ADMIN_KEY not set, admin endpoints will refuse every request");
    }

    let limiter = Arc::new(RateLimiter::open(config.rate_limit.clone())?);
    let _reaper = spawn_reaper(Arc::clone(&limiter));

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::new(config, Arc::clone(&limiter)));
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Flushing audit log");
    limiter.audit().flush().await;
    info!("Server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutting down server");
}
