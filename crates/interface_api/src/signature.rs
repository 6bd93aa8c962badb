//! Gateway webhook signatures
//!
//! The gateway signs the raw request body with HMAC-SHA256 under the shop
//! secret and sends the hex digest in the `X-YooMoney-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "x-yoomoney-signature";

type HmacSha256 = Hmac<Sha256>;

/// Signature errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Webhook signature required")]
    Missing,
    #[error("Invalid webhook signature")]
    Invalid,
}

fn keyed(secret: &str) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Invalid)
}

/// Signs a body, returning the lowercase hex digest
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = keyed(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a body against the header value
///
/// The digest comparison is constant-time.
///
/// # Errors
///
/// - `Missing` if the header is absent or blank
/// - `Invalid` if it is not hex or does not match the body
pub fn verify(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let expected = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;

    let mut mac = keyed(secret)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "shop-secret";
    const BODY: &[u8] = br#"{"event":"payment.succeeded"}"#;

    #[test]
    fn test_signed_body_verifies() {
        let signature = sign(SECRET, BODY).unwrap();
        assert_eq!(signature.len(), 64);
        assert_eq!(verify(SECRET, BODY, Some(&signature)), Ok(()));
        assert_eq!(verify(SECRET, BODY, Some(&signature.to_uppercase())), Ok(()));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign(SECRET, BODY).unwrap();
        let tampered = br#"{"event":"payment.succeeded","x":1}"#;
        assert_eq!(verify(SECRET, tampered, Some(&signature)), Err(SignatureError::Invalid));
        assert_eq!(verify("other", BODY, Some(&signature)), Err(SignatureError::Invalid));
    }

    #[test]
    fn test_missing_or_garbled_header() {
        assert_eq!(verify(SECRET, BODY, None), Err(SignatureError::Missing));
        assert_eq!(verify(SECRET, BODY, Some("  ")), Err(SignatureError::Missing));
        assert_eq!(verify(SECRET, BODY, Some("not-hex")), Err(SignatureError::Invalid));
    }
}
