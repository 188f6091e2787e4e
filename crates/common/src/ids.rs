use rand::RngCore;

/// The instance hash format: 16 lowercase hex characters.
pub const HASH_PATTERN_DESC: &str = "^[0-9a-f]{16}$";

/// Generate a fresh 16-character lowercase hex instance hash.
///
/// Sourced from 8 random bytes so collisions are astronomically unlikely
/// without needing a round-trip to the store to check uniqueness up front;
/// the store still enforces the `UNIQUE` constraint as the ground truth.
#[must_use]
pub fn generate_instance_hash() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Validate that `candidate` matches the instance hash format, case-insensitively.
#[must_use]
pub fn is_valid_instance_hash(candidate: &str) -> bool {
    candidate.len() == 16 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Normalize a hash to its canonical lowercase form.
#[must_use]
pub fn normalize_instance_hash(candidate: &str) -> String {
    candidate.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_hash_is_valid() {
        for _ in 0..64 {
            let hash = generate_instance_hash();
            assert_eq!(hash.len(), 16);
            assert!(is_valid_instance_hash(&hash));
            assert_eq!(hash, hash.to_ascii_lowercase());
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid_instance_hash("abc"));
        assert!(!is_valid_instance_hash("0123456789abcdef0"));
    }

    #[test]
    fn rejects_non_hex() {
        assert!(!is_valid_instance_hash("0123456789abcdeg"));
    }

    #[test]
    fn accepts_uppercase_but_normalizes() {
        let upper = "ABCDEF0123456789";
        assert!(is_valid_instance_hash(upper));
        assert_eq!(
            normalize_instance_hash(upper),
            "abcdef0123456789".to_string()
        );
    }
}
