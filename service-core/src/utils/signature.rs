use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `payload` under `secret`.
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare a computed hex digest with a caller-supplied one in constant time.
///
/// Length mismatch returns early; the length of a hex SHA-256 digest is
/// public anyway.
pub fn signatures_match(expected: &str, provided: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided.trim().as_bytes();

    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}

/// Verify `provided` against HMAC-SHA256(`secret`, `payload`).
pub fn verify_hmac_sha256(
    secret: &[u8],
    payload: &[u8],
    provided: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;
    Ok(signatures_match(&expected, provided))
}
