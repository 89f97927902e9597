//! HMAC signature verification for provider webhooks
//!
//! The delivery provider signs each webhook body with a shared secret.
//! Signatures are hex-encoded HMAC-SHA256 digests carried in the
//! `X-Lettermill-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 signature of a payload
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature against a payload in constant time
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let secret = "webhook-secret";
        let payload = br#"{"events":[]}"#;

        let sig = sign(secret, payload);
        assert!(verify(secret, payload, &sig));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let secret = "webhook-secret";
        let sig = sign(secret, b"original");

        assert!(!verify(secret, b"tampered", &sig));
        assert!(!verify("wrong-secret", b"original", &sig));
        assert!(!verify(secret, b"original", "not-hex"));
    }
}
