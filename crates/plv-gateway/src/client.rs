use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use plv_money::Money;

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Errors a [`GatewayClient`] implementation may return.
///
/// All variants are non-verdicts: the transaction's real outcome is unknown,
/// so callers must retry (or give up) without touching payment/booking state.
#[derive(Debug)]
pub enum GatewayError {
    /// Network or transport failure (timeout, connection refused, TLS).
    Transport(String),
    /// The gateway returned an application-level error.
    Api { code: Option<i64>, message: String },
    /// A response payload could not be decoded, or carried a transaction
    /// status that is not a definitive success/failure.
    Decode(String),
    /// A required configuration value (e.g. the secret key) is missing.
    Config(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transport(msg) => write!(f, "gateway transport error: {msg}"),
            GatewayError::Api {
                code: Some(c),
                message,
            } => write!(f, "gateway api error code={c}: {message}"),
            GatewayError::Api {
                code: None,
                message,
            } => write!(f, "gateway api error: {message}"),
            GatewayError::Decode(msg) => write!(f, "gateway decode error: {msg}"),
            GatewayError::Config(msg) => write!(f, "gateway config error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

// ---------------------------------------------------------------------------
// GatewayVerdict
// ---------------------------------------------------------------------------

/// A definitive transaction outcome as reported by the gateway.
///
/// Anything short of definitive (still processing, unknown reference shape,
/// unparseable status) must be a [`GatewayError`] instead — an indeterminate
/// answer is not allowed to fail a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayVerdict {
    Success,
    Failed,
}

impl GatewayVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayVerdict::Success => "success",
            GatewayVerdict::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Initiate request / response
// ---------------------------------------------------------------------------

/// Parameters for opening a hosted checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    /// Caller-generated correlation key (see [`crate::txref`]); the gateway
    /// echoes it in webhooks and verify responses.
    pub tx_ref: String,
    pub amount: Money,
    /// ISO currency code, e.g. `"MWK"`.
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Checkout page title, e.g. the hostel name.
    pub title: String,
    /// Checkout page description, e.g. room and stay dates.
    pub description: String,
    pub callback_url: Option<String>,
    pub return_url: Option<String>,
}

/// A successfully opened checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedTransaction {
    pub tx_ref: String,
    /// Hosted payment page the client is redirected to.
    pub checkout_url: String,
}

// ---------------------------------------------------------------------------
// GatewayClient
// ---------------------------------------------------------------------------

/// The gateway boundary. Implementations must be safe to call concurrently.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Open a checkout for the given charge.
    async fn initiate_transaction(
        &self,
        req: InitiateRequest,
    ) -> Result<InitiatedTransaction, GatewayError>;

    /// Ask the gateway for the definitive outcome of `tx_ref`.
    async fn verify_transaction(&self, tx_ref: &str) -> Result<GatewayVerdict, GatewayError>;
}

#[async_trait]
impl<T: GatewayClient + ?Sized> GatewayClient for Arc<T> {
    async fn initiate_transaction(
        &self,
        req: InitiateRequest,
    ) -> Result<InitiatedTransaction, GatewayError> {
        (**self).initiate_transaction(req).await
    }

    async fn verify_transaction(&self, tx_ref: &str) -> Result<GatewayVerdict, GatewayError> {
        (**self).verify_transaction(tx_ref).await
    }
}
