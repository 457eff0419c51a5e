//! HTTP/WebSocket entrypoint: loads config, opens the database pool, wires
//! `AppState`, spawns the background sweeps the dispatch and OTP flows depend
//! on, and serves the router until `ctrl_c`.

mod auth;
mod config;
mod dispatch_notify;
mod error;
mod routes;
mod state;
mod ws;

use std::time::Duration;

use dispatch_core::db::run_migrations;
use dispatch_core::scheduling::IntervalSweeper;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    });

    tracing_subscriber::fmt().with_env_filter(config.rust_log.clone()).json().init();
    info!("dispatch_server starting");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .unwrap_or_else(|e| {
            eprintln!("failed to connect to database: {e}");
            std::process::exit(1);
        });

    if let Err(e) = run_migrations(&pool).await {
        eprintln!("failed to run migrations: {e}");
        std::process::exit(1);
    }

    let bind_addr = config.bind_addr;
    let otp_ttl_min = config.dispatch.otp_ttl_min;
    let state = AppState::new(pool, config);

    tokio::spawn(otp_sweep(state.clone(), otp_ttl_min));
    tokio::spawn(offer_expiry_sweep(state.clone()));

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap_or_else(|e| {
        eprintln!("failed to bind {bind_addr}: {e}");
        std::process::exit(1);
    });
    info!(%bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown");
        })
        .await
        .unwrap_or_else(|e| {
            eprintln!("server error: {e}");
            std::process::exit(1);
        });
}

/// Clears expired/locked OTP records once per TTL window so the table doesn't
/// grow unbounded and stale locks don't outlive their purpose.
async fn otp_sweep(state: AppState, ttl_min: i64) {
    let period = Duration::from_secs((ttl_min.max(1) as u64) * 60);
    IntervalSweeper::new(period)
        .run_forever(|| {
            let state = state.clone();
            async move {
                match state.otp().sweep_expired().await {
                    Ok((codes, locks)) => info!(codes, locks, "otp sweep"),
                    Err(e) => error!(error = %e, "otp sweep failed"),
                }
            }
        })
        .await;
}

/// Drives the offer timeout outcome (§4.C8): any pending offer past its
/// `expires_at` is marked `EXPIRED` and the trip immediately redispatched to
/// the next candidate. Runs more often than the offer timeout itself so no
/// driver ties up a trip longer than necessary.
async fn offer_expiry_sweep(state: AppState) {
    IntervalSweeper::new(Duration::from_secs(5))
        .run_forever(|| {
            let state = state.clone();
            async move {
                if let Err(e) = dispatch_notify::sweep_expired_offers(&state).await {
                    error!(error = %e, "offer expiry sweep failed");
                }
            }
        })
        .await;
}
