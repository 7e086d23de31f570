use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a principal identifier string.
#[derive(Debug, thiserror::Error)]
pub enum PrincipalError {
    #[error("principal must start with '0x'")]
    InvalidPrefix,
    #[error("principal must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("principal payload is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("principal payload must be exactly 20 bytes")]
    InvalidPayloadLength,
}

/// Number of raw bytes in a principal identifier.
pub const PRINCIPAL_BYTES: usize = 20;
/// Expected string length of an encoded principal (`0x` prefix + 40 hex chars).
pub const PRINCIPAL_STRING_LENGTH: usize = 2 + PRINCIPAL_BYTES * 2;

/// An account identifier participating in ownership or access grants.
///
/// Source events may spell the same identifier in mixed case; parsing decodes
/// to raw bytes, so equality and map-key identity are case-insensitive by
/// construction. Re-encoding always produces the lowercase canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(pub [u8; PRINCIPAL_BYTES]);

impl Principal {
    /// Parse a principal from its textual form, accepting any letter case.
    pub fn parse(text: &str) -> Result<Self, PrincipalError> {
        if !text.starts_with("0x") && !text.starts_with("0X") {
            return Err(PrincipalError::InvalidPrefix);
        }

        if text.len() != PRINCIPAL_STRING_LENGTH {
            return Err(PrincipalError::InvalidLength {
                expected: PRINCIPAL_STRING_LENGTH,
                actual: text.len(),
            });
        }

        let decoded = hex::decode(&text[2..])?;
        let bytes: [u8; PRINCIPAL_BYTES] = decoded
            .try_into()
            .map_err(|_| PrincipalError::InvalidPayloadLength)?;

        Ok(Principal(bytes))
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PRINCIPAL_BYTES] {
        &self.0
    }

    /// Encode into the canonical lowercase `0x...` form.
    pub fn to_canonical(&self) -> String {
        let mut encoded = String::with_capacity(PRINCIPAL_STRING_LENGTH);
        encoded.push_str("0x");
        encoded.push_str(&hex::encode(self.0));
        encoded
    }
}

/// Check whether the provided string is a valid principal identifier.
pub fn is_valid_principal(text: &str) -> bool {
    Principal::parse(text).is_ok()
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl From<[u8; PRINCIPAL_BYTES]> for Principal {
    fn from(value: [u8; PRINCIPAL_BYTES]) -> Self {
        Principal(value)
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.to_canonical()
    }
}

impl TryFrom<String> for Principal {
    type Error = PrincipalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Principal::parse(&value)
    }
}
