//! HTTP route table (§6's "HTTP surface (core-relevant)"). Each submodule owns one
//! resource group; this module only wires them onto the router and applies the
//! shared middleware stack.

mod auth_routes;
mod credit_purchases;
mod dispatch_admin;
mod trips;
mod wallet;
mod webhook;

use std::time::Duration;

use axum::routing::{get, patch, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ws;

pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/dispatch/config", get(dispatch_admin::get_config).put(dispatch_admin::put_config))
        .route("/dispatch/offers", get(dispatch_admin::list_offers))
        .route("/credit-purchases/:id/approve", post(credit_purchases::approve))
        .route("/credit-purchases/:id/reject", post(credit_purchases::reject))
        // Admin listing queries can fan out to a large offer table; capped
        // separately from the rest of the surface so a slow admin scan can't
        // starve rider/driver-facing requests of connection slots.
        .layer(ConcurrencyLimitLayer::new(8));

    let api_routes = Router::new()
        .route("/trips", post(trips::create_trip))
        .route("/trips/:id/accept", post(trips::accept_trip_legacy))
        .route("/trips/:id/status", patch(trips::update_status))
        .route("/trips/:id/sos", post(trips::sos))
        .route("/trips/:id/payment-collected", post(trips::payment_collected))
        .route("/trips/:id/settle", post(trips::settle))
        .route("/credit-purchases", post(credit_purchases::submit))
        .route("/auth/request-otp", post(auth_routes::request_otp))
        .route("/auth/verify-otp", post(auth_routes::verify_otp))
        .route("/wallet/balance", get(wallet::balance))
        .route("/wallet/process-trip-payment", post(wallet::process_trip_payment))
        .route("/whatsapp/webhook", get(webhook::verify).post(webhook::receive))
        .route("/ws", get(ws::upgrade))
        .merge(admin_routes);

    Router::new()
        .merge(api_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(30))),
        )
}
