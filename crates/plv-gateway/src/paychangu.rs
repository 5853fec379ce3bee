//! PayChangu REST client.
//!
//! Two calls only: `POST {base}/payment` to open a hosted checkout and
//! `GET {base}/verify-payment/{tx_ref}` to fetch a transaction's outcome.
//! Requests carry Bearer auth and a hard 20 s timeout; a timed-out verify
//! surfaces as [`GatewayError::Transport`] and the caller retries later.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::{
    GatewayClient, GatewayError, GatewayVerdict, InitiateRequest, InitiatedTransaction,
};

pub const ENV_SECRET_KEY: &str = "PAYCHANGU_SECRET_KEY";
pub const ENV_BASE_URL: &str = "PAYCHANGU_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.paychangu.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct InitiateBody<'a> {
    /// Display units; the gateway API speaks decimal amounts.
    amount: f64,
    currency: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    tx_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_url: Option<&'a str>,
    customization: Customization<'a>,
}

#[derive(Debug, Serialize)]
struct Customization<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    /// `"success"` on the happy path; anything else is an API-level refusal.
    status: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitiateData {
    checkout_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    /// Transaction status: `"success"`, `"failed"`, or an in-flight value.
    status: String,
}

// ---------------------------------------------------------------------------
// PayChanguClient
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PayChanguClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PayChanguClient {
    pub fn new(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let secret_key = secret_key.into();
        if secret_key.is_empty() {
            return Err(GatewayError::Config("empty gateway secret key".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    /// Construct from `PAYCHANGU_SECRET_KEY` / `PAYCHANGU_BASE_URL`.
    pub fn from_env() -> Result<Self, GatewayError> {
        let secret = std::env::var(ENV_SECRET_KEY)
            .map_err(|_| GatewayError::Config(format!("missing env var {ENV_SECRET_KEY}")))?;
        let base =
            std::env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(secret, base)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<Envelope<T>, GatewayError> {
        let http_status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(format!("read body: {e}")))?;
        let envelope: Envelope<T> = serde_json::from_slice(&body).map_err(|e| {
            GatewayError::Decode(format!("invalid gateway response ({http_status}): {e}"))
        })?;
        if envelope.status != "success" {
            return Err(GatewayError::Api {
                code: Some(i64::from(http_status.as_u16())),
                message: envelope
                    .message
                    .unwrap_or_else(|| "gateway reported failure".to_string()),
            });
        }
        Ok(envelope)
    }
}

#[async_trait]
impl GatewayClient for PayChanguClient {
    async fn initiate_transaction(
        &self,
        req: InitiateRequest,
    ) -> Result<InitiatedTransaction, GatewayError> {
        let body = InitiateBody {
            amount: req.amount.to_major_f64(),
            currency: &req.currency,
            email: &req.email,
            first_name: &req.first_name,
            last_name: &req.last_name,
            tx_ref: &req.tx_ref,
            callback_url: req.callback_url.as_deref(),
            return_url: req.return_url.as_deref(),
            customization: Customization {
                title: &req.title,
                description: &req.description,
            },
        };

        let resp = self
            .http
            .post(format!("{}/payment", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let envelope: Envelope<InitiateData> = Self::decode(resp).await?;
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Decode("initiate response missing data".into()))?;
        Ok(InitiatedTransaction {
            tx_ref: req.tx_ref,
            checkout_url: data.checkout_url,
        })
    }

    async fn verify_transaction(&self, tx_ref: &str) -> Result<GatewayVerdict, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/verify-payment/{tx_ref}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let envelope: Envelope<VerifyData> = Self::decode(resp).await?;
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Decode("verify response missing data".into()))?;

        match data.status.as_str() {
            "success" => Ok(GatewayVerdict::Success),
            "failed" => Ok(GatewayVerdict::Failed),
            // Anything in flight ("pending", "processing", …) is not a
            // verdict; the caller must poll again rather than fail a booking
            // on an indeterminate answer.
            other => Err(GatewayError::Decode(format!(
                "non-definitive transaction status: {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (httpmock)
// ---------------------------------------------------------------------------
