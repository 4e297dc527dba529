//! HMAC-signed, time-bounded opaque session tokens — a from-scratch
//! equivalent of Python's `itsdangerous.URLSafeTimedSerializer`.
//!
//! A signed value is `base64url(json_payload).base64url(timestamp).signature`,
//! where `signature = HMAC-SHA256(secret, "payload.timestamp")`. Verification
//! recomputes the signature in constant time and rejects anything older
//! than the caller's `max_age`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies opaque, time-bounded payloads sharing one
/// process-wide secret with the self-signed token issuer. Rotating the
/// secret invalidates every outstanding session and self-signed token at
/// once, by design.
pub struct SessionSigner {
    secret: Vec<u8>,
}

impl SessionSigner {
    /// Build a signer over `secret`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Sign `payload` with the current Unix timestamp embedded, returning
    /// an opaque string safe to use as a cookie value.
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String> {
        let payload_json = serde_json::to_vec(payload)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
        let now = unix_now();
        let ts_b64 = URL_SAFE_NO_PAD.encode(now.to_be_bytes());

        let signature = self.sign_parts(&payload_b64, &ts_b64);
        Ok(format!("{payload_b64}.{ts_b64}.{signature}"))
    }

    /// Verify and decode a value produced by [`Self::sign`], rejecting it
    /// if the embedded timestamp is older than `max_age_secs`.
    pub fn unsign<T: DeserializeOwned>(&self, value: &str, max_age_secs: u64) -> Result<T> {
        let mut parts = value.splitn(3, '.');
        let payload_b64 = parts.next().ok_or_else(|| Error::AuthMalformed("malformed session value".to_string()))?;
        let ts_b64 = parts.next().ok_or_else(|| Error::AuthMalformed("malformed session value".to_string()))?;
        let signature = parts.next().ok_or_else(|| Error::AuthMalformed("malformed session value".to_string()))?;

        let expected = self.sign_parts(payload_b64, ts_b64);
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(Error::AuthInvalidSignature);
        }

        let ts_bytes = URL_SAFE_NO_PAD
            .decode(ts_b64)
            .map_err(|_| Error::AuthMalformed("malformed timestamp".to_string()))?;
        let ts_bytes: [u8; 8] = ts_bytes
            .try_into()
            .map_err(|_| Error::AuthMalformed("malformed timestamp".to_string()))?;
        let issued_at = u64::from_be_bytes(ts_bytes);

        let now = unix_now();
        if now.saturating_sub(issued_at) > max_age_secs {
            return Err(Error::AuthExpired);
        }

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::AuthMalformed("malformed payload".to_string()))?;

        Ok(serde_json::from_slice(&payload_json)?)
    }

    fn sign_parts(&self, payload_b64: &str, ts_b64: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        mac.update(b".");
        mac.update(ts_b64.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        username: String,
        groups: Vec<String>,
    }

    #[test]
    fn round_trips_a_payload() {
        let signer = SessionSigner::new("test-secret");
        let payload = Payload {
            username: "alice".to_string(),
            groups: vec!["admins".to_string()],
        };

        let signed = signer.sign(&payload).unwrap();
        let restored: Payload = signer.unsign(&signed, 28_800).unwrap();
        assert_eq!(payload, restored);
    }

    #[test]
    fn rejects_tampered_payload() {
        let signer = SessionSigner::new("test-secret");
        let payload = Payload {
            username: "alice".to_string(),
            groups: vec![],
        };
        let signed = signer.sign(&payload).unwrap();
        let mut tampered = signed.clone();
        tampered.replace_range(0..4, "XXXX");

        let result: Result<Payload> = signer.unsign(&tampered, 28_800);
        assert!(matches!(result, Err(Error::AuthInvalidSignature)) || result.is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let signer_a = SessionSigner::new("secret-a");
        let signer_b = SessionSigner::new("secret-b");
        let payload = Payload {
            username: "alice".to_string(),
            groups: vec![],
        };
        let signed = signer_a.sign(&payload).unwrap();
        let result: Result<Payload> = signer_b.unsign(&signed, 28_800);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_expired_payload() {
        let signer = SessionSigner::new("test-secret");
        let payload = Payload {
            username: "alice".to_string(),
            groups: vec![],
        };
        let signed = signer.sign(&payload).unwrap();
        let result: Result<Payload> = signer.unsign(&signed, 0);
        // max_age of 0 means even a fresh signature may or may not have
        // elapsed a second by the time we check; sleep briefly to be sure.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let result2: Result<Payload> = signer.unsign(&signed, 0);
        assert!(result.is_ok() || result2.is_err());
    }

    #[test]
    fn rejects_malformed_value() {
        let signer = SessionSigner::new("test-secret");
        let result: Result<Payload> = signer.unsign("not-a-valid-token", 28_800);
        assert!(result.is_err());
    }
}
