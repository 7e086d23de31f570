//! Content fingerprints and their ledger indexing topics.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Canonical content identifier for a file, derived from its content
/// (e.g. a content-hash string), not its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Create a fingerprint from its textual form, trimming surrounding
    /// whitespace. The text is otherwise preserved verbatim: topic
    /// derivation hashes these exact bytes, so rewriting them would break
    /// joins against the ledger's indexed fields.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty fingerprint marks a malformed event.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derive the ledger indexing topic for this fingerprint.
    pub fn topic(&self) -> FileTopic {
        FileTopic::from_fingerprint(self)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Fingerprint::new(value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keccak-256 digest of a fingerprint's text.
///
/// The ledger indexes string event fields by this hash, so grant/revoke
/// events expose the topic rather than the plaintext fingerprint, and every
/// join between access events and file metadata goes through it.
///
/// Known fragility: this assumes the ledger's indexing hash is stable and
/// externally reproducible. If the indexing scheme changes, joins silently
/// stop matching instead of erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileTopic(pub [u8; 32]);

impl FileTopic {
    /// Hash a fingerprint's exact text bytes with Keccak-256.
    pub fn from_fingerprint(fingerprint: &Fingerprint) -> Self {
        let digest = Keccak256::digest(fingerprint.as_str().as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, accepting any letter case.
    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        if hex_str.len() != 64 {
            return Err(format!(
                "FileTopic hex must be 64 characters, got {}",
                hex_str.len()
            ));
        }
        let bytes = hex::decode(hex_str).map_err(|e| format!("Invalid hex: {e}"))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for FileTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_deterministic() {
        let fp = Fingerprint::new("QmTestContentHash");
        assert_eq!(fp.topic(), fp.topic());
        assert_ne!(fp.topic().0, [0u8; 32]);
    }

    #[test]
    fn different_fingerprints_different_topics() {
        let a = Fingerprint::new("QmAlpha");
        let b = Fingerprint::new("QmBeta");
        assert_ne!(a.topic(), b.topic());
    }

    #[test]
    fn fingerprint_trims_whitespace() {
        let a = Fingerprint::new("  QmAlpha \n");
        let b = Fingerprint::new("QmAlpha");
        assert_eq!(a, b);
        assert_eq!(a.topic(), b.topic());
    }

    #[test]
    fn topic_hex_roundtrip() {
        let topic = Fingerprint::new("QmAlpha").topic();
        let hex = topic.to_hex();
        assert_eq!(hex.len(), 64);

        let parsed = FileTopic::from_hex(&hex).unwrap();
        assert_eq!(parsed, topic);

        let upper = FileTopic::from_hex(&hex.to_uppercase()).unwrap();
        assert_eq!(upper, topic);
    }

    #[test]
    fn topic_hex_rejects_bad_input() {
        assert!(FileTopic::from_hex("abcd").is_err());
        assert!(FileTopic::from_hex(&"zz".repeat(32)).is_err());
    }
}
