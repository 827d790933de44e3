use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Stable cache key for a normalized URL. Keying on the canonical form
/// keeps trivially different spellings (case, default ports, fragments)
/// from fragmenting the cache.
pub fn cache_key(request_target: &str) -> String {
    format!("scan_{}", sha256_hex(request_target.as_bytes()))
}
