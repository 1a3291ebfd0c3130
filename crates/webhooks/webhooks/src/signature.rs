//! HMAC signature generation and verification.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use gridhook_core::{ValidationError, ValidationKey, ValidationResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature of a single-event (CloudEvents) delivery.
pub const CLOUD_EVENT_SIGNATURE_HEADER: &str = "ce-signature";

/// Header carrying the signature of a batch (Event Grid schema) delivery.
pub const EVENT_GRID_SIGNATURE_HEADER: &str = "aeg-signature";

/// Event signer for generating and verifying delivery signatures.
///
/// A signature is the base64 HMAC-SHA256 of the exact raw body, keyed with
/// the UTF-8 bytes of the shared validation key.
pub struct EventSigner {
    key: ValidationKey,
}

impl EventSigner {
    /// Creates a new signer with the given key.
    pub fn new(key: ValidationKey) -> Self {
        Self { key }
    }

    /// Generates the signature for the given body.
    pub fn sign(&self, body: &[u8]) -> String {
        sign(self.key.expose(), body)
    }

    /// Verifies a signature against the body.
    ///
    /// The comparison ignores ASCII case and runs in constant time for
    /// signatures of the expected length.
    pub fn verify(&self, signature: &str, body: &[u8]) -> bool {
        let expected = self.sign(body);
        constant_time_eq_ignore_case(expected.as_bytes(), signature.trim().as_bytes())
    }
}

impl std::fmt::Debug for EventSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSigner").field("key", &self.key).finish()
    }
}

/// Computes the signature a sender holding `key` would attach to `body`.
pub fn sign(key: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verifies `signature` over `body`. A missing key fails closed.
pub fn verify(key: Option<&ValidationKey>, body: &[u8], signature: &str) -> bool {
    check(key, body, signature).is_ok()
}

/// Like [`verify`], but tells a missing key apart from a bad signature.
pub fn check(key: Option<&ValidationKey>, body: &[u8], signature: &str) -> ValidationResult<()> {
    let key = key.ok_or(ValidationError::SigningKeyMissing)?;
    if EventSigner::new(key.clone()).verify(signature, body) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSignature)
    }
}

/// Constant-time byte comparison, folding ASCII case first.
fn constant_time_eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let a: Vec<u8> = a.iter().map(u8::to_ascii_lowercase).collect();
    let b: Vec<u8> = b.iter().map(u8::to_ascii_lowercase).collect();
    bool::from(a.ct_eq(&b))
}
