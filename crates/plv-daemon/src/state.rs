//! Shared runtime state for plv-daemon.
//!
//! Everything behind `Arc<dyn …>` so the router is wired identically over
//! Postgres + PayChangu in `main.rs` and over the in-memory store + paper
//! gateway in the scenario tests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use plv_gateway::GatewayClient;
use plv_reconcile::{
    BookingStore, Clock, FeeConfig, ReconcileEngine, ReconcileHook, ReconcileStore,
};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// PaymentUrls
// ---------------------------------------------------------------------------

/// Gateway redirect targets, from `PAYMENT_CALLBACK_URL` / `PAYMENT_RETURN_URL`.
#[derive(Clone, Debug, Default)]
pub struct PaymentUrls {
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
}

impl PaymentUrls {
    pub fn from_env() -> Self {
        Self {
            callback_url: std::env::var("PAYMENT_CALLBACK_URL").ok(),
            return_url: std::env::var("PAYMENT_RETURN_URL").ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared (via `Arc`) across all Axum handlers.
pub struct AppState {
    pub engine: ReconcileEngine<Arc<dyn ReconcileStore>, Arc<dyn FeeConfig>>,
    pub store: Arc<dyn BookingStore>,
    pub gateway: Arc<dyn GatewayClient>,
    pub fees: Arc<dyn FeeConfig>,
    pub clock: Arc<dyn Clock>,
    /// Secret for webhook HMAC verification; requests failing it never reach
    /// the engine.
    pub webhook_secret: String,
    pub payment_urls: PaymentUrls,
    pub build: BuildInfo,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reconcile_store: Arc<dyn ReconcileStore>,
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn GatewayClient>,
        fees: Arc<dyn FeeConfig>,
        clock: Arc<dyn Clock>,
        webhook_secret: String,
        payment_urls: PaymentUrls,
        hooks: Vec<Arc<dyn ReconcileHook>>,
    ) -> Self {
        let mut engine = ReconcileEngine::new(reconcile_store, Arc::clone(&fees))
            .with_clock(Arc::clone(&clock));
        for hook in hooks {
            engine = engine.add_hook(hook);
        }

        Self {
            engine,
            store,
            gateway,
            fees,
            clock,
            webhook_secret,
            payment_urls,
            build: BuildInfo {
                service: "plv-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
