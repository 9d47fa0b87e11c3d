use anyhow::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the vendor's HMAC of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-hmac-signature";
/// Older header name, still sent by some vendor integrations.
pub const LEGACY_SIGNATURE_HEADER: &str = "x-signature";

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex signature against the raw body. Case and surrounding
/// whitespace in `provided` are ignored.
pub fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let expected = match sign(secret, body) {
        Ok(expected) => expected,
        Err(_) => return false,
    };
    let provided = provided.trim().to_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
