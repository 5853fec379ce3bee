//! Deterministic in-memory "paper" gateway.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - `checkout_url` is a stable string derived from the tx_ref:
//!     "paper:checkout:{tx_ref}"
//! - Verdicts are scripted per tx_ref before the call; verifying an
//!   unscripted tx_ref is an API error, like asking a real gateway about a
//!   transaction it never saw.
//! - `script_outage` makes the next verify for that tx_ref fail with a
//!   transport error, for exercising the no-mutation-on-timeout contract.
//! - No randomness. No timestamps. No network.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{
    GatewayClient, GatewayError, GatewayVerdict, InitiateRequest, InitiatedTransaction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scripted {
    Verdict(GatewayVerdict),
    Outage,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: BTreeMap<String, Scripted>,
    initiated: Vec<String>,
}

#[derive(Debug, Default)]
pub struct PaperGateway {
    inner: Mutex<Inner>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a success verdict for `tx_ref`.
    pub fn script_success(&self, tx_ref: impl Into<String>) {
        self.script(tx_ref, Scripted::Verdict(GatewayVerdict::Success));
    }

    /// Script a failure verdict for `tx_ref`.
    pub fn script_failure(&self, tx_ref: impl Into<String>) {
        self.script(tx_ref, Scripted::Verdict(GatewayVerdict::Failed));
    }

    /// Script a transport outage for `tx_ref`: verify returns
    /// [`GatewayError::Transport`] until re-scripted.
    pub fn script_outage(&self, tx_ref: impl Into<String>) {
        self.script(tx_ref, Scripted::Outage);
    }

    /// tx_refs initiated through this gateway, in call order.
    pub fn initiated(&self) -> Vec<String> {
        self.inner.lock().expect("paper gateway poisoned").initiated.clone()
    }

    fn script(&self, tx_ref: impl Into<String>, s: Scripted) {
        self.inner
            .lock()
            .expect("paper gateway poisoned")
            .scripts
            .insert(tx_ref.into(), s);
    }
}

#[async_trait]
impl GatewayClient for PaperGateway {
    async fn initiate_transaction(
        &self,
        req: InitiateRequest,
    ) -> Result<InitiatedTransaction, GatewayError> {
        let mut inner = self.inner.lock().expect("paper gateway poisoned");
        inner.initiated.push(req.tx_ref.clone());
        Ok(InitiatedTransaction {
            checkout_url: format!("paper:checkout:{}", req.tx_ref),
            tx_ref: req.tx_ref,
        })
    }

    async fn verify_transaction(&self, tx_ref: &str) -> Result<GatewayVerdict, GatewayError> {
        let inner = self.inner.lock().expect("paper gateway poisoned");
        match inner.scripts.get(tx_ref) {
            Some(Scripted::Verdict(v)) => Ok(*v),
            Some(Scripted::Outage) => {
                Err(GatewayError::Transport("scripted outage".to_string()))
            }
            None => Err(GatewayError::Api {
                code: None,
                message: format!("unknown transaction: {tx_ref}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plv_money::Money;

    fn req(tx_ref: &str) -> InitiateRequest {
        InitiateRequest {
            tx_ref: tx_ref.to_string(),
            amount: Money::from_major(12_500).unwrap(),
            currency: "MWK".into(),
            email: "student@example.com".into(),
            first_name: "Thoko".into(),
            last_name: "Banda".into(),
            title: "t".into(),
            description: "d".into(),
            callback_url: None,
            return_url: None,
        }
    }

    #[tokio::test]
    async fn initiate_is_deterministic() {
        let gw = PaperGateway::new();
        let out = gw.initiate_transaction(req("bk_1")).await.unwrap();
        assert_eq!(out.checkout_url, "paper:checkout:bk_1");
        assert_eq!(gw.initiated(), vec!["bk_1".to_string()]);
    }

    #[tokio::test]
    async fn scripted_verdicts_are_returned() {
        let gw = PaperGateway::new();
        gw.script_success("bk_1");
        gw.script_failure("bk_2");
        assert_eq!(
            gw.verify_transaction("bk_1").await.unwrap(),
            GatewayVerdict::Success
        );
        assert_eq!(
            gw.verify_transaction("bk_2").await.unwrap(),
            GatewayVerdict::Failed
        );
    }

    #[tokio::test]
    async fn outage_is_a_transport_error() {
        let gw = PaperGateway::new();
        gw.script_outage("bk_1");
        let err = gw.verify_transaction("bk_1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn unknown_tx_ref_is_an_api_error() {
        let gw = PaperGateway::new();
        let err = gw.verify_transaction("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::Api { .. }));
    }
}
