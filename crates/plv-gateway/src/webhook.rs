//! Webhook callback signature verification.
//!
//! The provider signs the raw request body with HMAC-SHA256 (hex digest in
//! the `Signature` header). Verification is a precondition enforced by the
//! HTTP layer before any reconciliation runs — the core never sees an
//! unverified event. Comparison is constant-time via `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// SignatureError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The header value is not valid hex of the right shape.
    Malformed,
    /// The signature does not match the payload.
    Invalid,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureError::Malformed => write!(f, "malformed webhook signature"),
            SignatureError::Invalid => write!(f, "invalid webhook signature"),
        }
    }
}

impl std::error::Error for SignatureError {}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify `signature_hex` against `raw_body` using `secret`.
pub fn verify_signature(
    secret: &str,
    raw_body: &[u8],
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let sig = hex::decode(signature_hex.trim()).map_err(|_| SignatureError::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Malformed)?;
    mac.update(raw_body);
    mac.verify_slice(&sig).map_err(|_| SignatureError::Invalid)
}

/// Compute the hex signature for `raw_body`. Used by tests and by outbound
/// callbacks that must be signed the same way.
pub fn sign(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn sign_then_verify_round_trips() {
        let body = br#"{"tx_ref":"bk_1","status":"success"}"#;
        let sig = sign(SECRET, body);
        assert!(verify_signature(SECRET, body, &sig).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let body = br#"{"tx_ref":"bk_1","status":"success"}"#;
        let sig = sign(SECRET, body);
        let tampered = br#"{"tx_ref":"bk_1","status":"failed"}"#;
        assert_eq!(
            verify_signature(SECRET, tampered, &sig),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let sig = sign(SECRET, body);
        assert_eq!(
            verify_signature("whsec_other", body, &sig),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn non_hex_signature_is_malformed() {
        assert_eq!(
            verify_signature(SECRET, b"payload", "not-hex!"),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let body = b"payload";
        let sig = format!("  {}\n", sign(SECRET, body));
        assert!(verify_signature(SECRET, body, &sig).is_ok());
    }
}
