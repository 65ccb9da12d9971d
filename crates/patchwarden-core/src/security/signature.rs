//! Webhook signature verification
//!
//! Deliveries carry `sha256=<hex>` computed as HMAC-SHA256 of the raw body
//! under a shared secret. Comparison is constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header value prefix
pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Clone)]
enum Mode {
    Enforce(Vec<u8>),
    /// Explicit opt-in; every delivery is accepted
    Bypass,
}

/// Verifies inbound delivery signatures
#[derive(Clone)]
pub struct SignatureVerifier {
    mode: Mode,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            Mode::Enforce(_) => "enforce",
            Mode::Bypass => "bypass",
        };
        f.debug_struct("SignatureVerifier").field("mode", &mode).finish()
    }
}

impl SignatureVerifier {
    /// Enforcing verifier. An empty secret is rejected.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(CoreError::MissingSecret);
        }
        Ok(Self {
            mode: Mode::Enforce(secret),
        })
    }

    /// Build from optional configuration. Without a secret this only
    /// succeeds when `test_mode` is explicitly enabled.
    pub fn from_settings(secret: Option<&str>, test_mode: bool) -> Result<Self> {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret.as_bytes().to_vec()),
            None if test_mode => {
                tracing::warn!("Webhook signature verification is DISABLED (test mode)");
                Ok(Self::insecure_bypass())
            }
            None => Err(CoreError::MissingSecret),
        }
    }

    /// Verifier that accepts every delivery. Test use only.
    pub fn insecure_bypass() -> Self {
        Self { mode: Mode::Bypass }
    }

    pub fn is_bypassed(&self) -> bool {
        matches!(self.mode, Mode::Bypass)
    }

    /// Header value for `body`, or `None` in bypass mode
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        match &self.mode {
            Mode::Enforce(secret) => compute(secret, body).map(|hex| format!("{}{}", SIGNATURE_PREFIX, hex)),
            Mode::Bypass => None,
        }
    }

    /// Check `header` against the body. Never panics; absent or malformed
    /// headers are simply `false`.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> bool {
        let secret = match &self.mode {
            Mode::Bypass => return true,
            Mode::Enforce(secret) => secret,
        };

        let header = match header {
            Some(h) if h.starts_with(SIGNATURE_PREFIX) => h.trim(),
            _ => return false,
        };

        let expected = match compute(secret, body) {
            Some(hex) => format!("{}{}", SIGNATURE_PREFIX, hex),
            None => return false,
        };

        expected.as_bytes().ct_eq(header.as_bytes()).into()
    }
}

fn compute(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Sign `body` with `secret`, producing a header value
pub fn sign_payload(secret: &[u8], body: &[u8]) -> Option<String> {
    compute(secret, body).map(|hex| format!("{}{}", SIGNATURE_PREFIX, hex))
}
