//! BLAKE3 content hashing.
//!
//! Used to derive change tokens: identical payloads hash identically, so a
//! client holding the token of its last read can be told "nothing changed".

/// Compute the BLAKE3 hash of content, returning a hex string.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Hash a serializable value through its JSON encoding.
pub fn json_hash<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(content_hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash(b"alice"), content_hash(b"alice"));
        assert_ne!(content_hash(b"alice"), content_hash(b"alice!"));
    }

    #[test]
    fn test_content_hash_length() {
        assert_eq!(content_hash(b"").len(), 64);
    }

    #[test]
    fn test_json_hash_follows_content() {
        let a = json_hash(&vec!["x", "y"]).unwrap();
        let b = json_hash(&vec!["x", "y"]).unwrap();
        let c = json_hash(&vec!["y", "x"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
