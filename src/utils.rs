use serde::Serialize;
use sha2::{Sha256, Digest};
use hex;

use crate::{Result, LedgerError};

/// Calculate SHA-256 hash of the given data
///
/// # Arguments
/// * `data` - The data to hash
///
/// # Returns
/// * `String` - The hex-encoded hash
///
/// # Example
/// ```
/// use qfc::utils::calculate_hash;
///
/// let hash = calculate_hash("Hello, Ledger!");
/// assert_eq!(hash.len(), 64); // SHA-256 produces 32 bytes = 64 hex chars
/// ```
pub fn calculate_hash<T: AsRef<[u8]>>(data: T) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Encode a value as canonical key-sorted JSON.
///
/// Hashing inputs must be byte-identical for equal values, so everything that
/// feeds a digest goes through this function. `serde_json::Value` keeps its
/// object keys ordered, which makes the round-trip deterministic.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(value.to_string())
}

/// Check if a hash meets the proof-of-work difficulty requirement
///
/// # Arguments
/// * `hash` - The hash to check
/// * `difficulty` - Number of leading hex zeros required
///
/// # Example
/// ```
/// use qfc::utils::hash_meets_difficulty;
///
/// let hash = "0000abcdef1234567890abcdef1234567890abcdef1234567890abcdef123456";
/// assert!(hash_meets_difficulty(hash, 4));
/// assert!(!hash_meets_difficulty(hash, 5));
/// ```
pub fn hash_meets_difficulty(hash: &str, difficulty: u32) -> bool {
    if difficulty == 0 {
        return true;
    }

    let target = "0".repeat(difficulty as usize);
    hash.starts_with(&target)
}

/// Parse the routing nibble of an address: the first character as a hex digit.
///
/// Returns `None` for empty addresses and for addresses whose first character
/// is not a hex digit; callers reject those as malformed.
pub fn address_nibble(address: &str) -> Option<u32> {
    address.chars().next().and_then(|c| c.to_digit(16))
}

/// Convert bytes to a lowercase hex string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Convert a hex string to bytes
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    hex::decode(hex_str).map_err(|e| LedgerError::SerializationError(e.to_string()))
}

/// Validate that a string is entirely hex
pub fn is_valid_hex(hex_str: &str) -> bool {
    !hex_str.is_empty() && hex_str.chars().all(|c| c.is_ascii_hexdigit())
}

/// Format a unix timestamp for display
pub fn format_timestamp(timestamp: i64) -> String {
    use chrono::DateTime;
    let dt = DateTime::from_timestamp(timestamp, 0).unwrap_or_default();
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hash() {
        let hash = calculate_hash("test");
        assert_eq!(hash.len(), 64);
        assert!(is_valid_hex(&hash));
    }

    #[test]
    fn test_calculate_hash_is_stable() {
        assert_eq!(calculate_hash("same input"), calculate_hash("same input"));
        assert_ne!(calculate_hash("one"), calculate_hash("two"));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        #[derive(serde::Serialize)]
        struct Unordered {
            zebra: u32,
            alpha: u32,
            middle: u32,
        }

        let json = canonical_json(&Unordered { zebra: 1, alpha: 2, middle: 3 }).unwrap();
        assert_eq!(json, r#"{"alpha":2,"middle":3,"zebra":1}"#);
    }

    #[test]
    fn test_hash_meets_difficulty() {
        let hash = "0000abcdef1234567890abcdef1234567890abcdef1234567890abcdef123456";
        assert!(hash_meets_difficulty(hash, 4));
        assert!(!hash_meets_difficulty(hash, 5));
        assert!(hash_meets_difficulty(hash, 0));
    }

    #[test]
    fn test_address_nibble() {
        assert_eq!(address_nibble("a1b2"), Some(10));
        assert_eq!(address_nibble("0xyz"), Some(0));
        assert_eq!(address_nibble("F"), Some(15));
        assert_eq!(address_nibble("zed"), None);
        assert_eq!(address_nibble(""), None);
        assert_eq!(address_nibble("Network"), None);
    }

    #[test]
    fn test_hex_round_trip() {
        let bytes = vec![0x01, 0x02, 0x03, 0x04];
        let hex_str = bytes_to_hex(&bytes);
        assert_eq!(hex_str, "01020304");
        assert_eq!(hex_to_bytes(&hex_str).unwrap(), bytes);
    }

    #[test]
    fn test_is_valid_hex() {
        assert!(is_valid_hex("abcdef123456"));
        assert!(is_valid_hex("ABCDEF123456"));
        assert!(!is_valid_hex("abcdef12345g"));
        assert!(!is_valid_hex(""));
    }
}
