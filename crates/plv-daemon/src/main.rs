//! plv-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects Postgres,
//! wires the engine over the real gateway, spawns the notification
//! dispatcher, and starts the HTTP server. All route handlers live in
//! `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use plv_daemon::{routes, state};
use plv_gateway::PayChanguClient;
use plv_notify::{notification_channel, spawn_dispatcher, LogSink, DEFAULT_QUEUE_CAPACITY};
use plv_reconcile::{ReconcileHook, SystemClock};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

pub const ENV_WEBHOOK_SECRET: &str = "PAYCHANGU_WEBHOOK_SECRET";
pub const ENV_DAEMON_ADDR: &str = "PLV_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let pool = plv_db::connect_from_env().await?;
    plv_db::migrate(&pool).await?;
    let store = Arc::new(plv_db::PgStore::new(pool));

    let gateway = Arc::new(PayChanguClient::from_env()?);
    let webhook_secret = std::env::var(ENV_WEBHOOK_SECRET)
        .with_context(|| format!("missing env var {ENV_WEBHOOK_SECRET}"))?;

    // Notification pipeline: reconcile commits push jobs onto the queue; the
    // dispatcher drains it independently of request lifecycles.
    let (notifier, jobs) = notification_channel(DEFAULT_QUEUE_CAPACITY);
    spawn_dispatcher(jobs, Arc::new(LogSink), Arc::new(LogSink));

    let shared = Arc::new(state::AppState::new(
        store.clone(),
        store.clone(),
        gateway,
        store,
        Arc::new(SystemClock),
        webhook_secret,
        state::PaymentUrls::from_env(),
        vec![Arc::new(notifier) as Arc<dyn ReconcileHook>],
    ));

    let app = routes::build_router(shared)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("plv-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

/// CORS: allow only localhost origins (the admin console and dev frontends).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
