use crate::core::errors::{PassrelayError, Result};

/// Length of a key identifier in bytes.
pub const KEY_ID_LEN: usize = 8;

/// Identifier of a long-term key or one of its sub-keys.
///
/// Rendered as 16 lowercase hex characters. Identifiers are assumed to be
/// globally unique across keys; nothing enforces that, and resolution takes
/// the first match when they are not.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId([u8; KEY_ID_LEN]);

impl KeyId {
    /// Parse a 16-character hex string, case-insensitive.
    pub fn from_hex(value: &str) -> Result<Self> {
        let decoded = hex::decode(value).map_err(|_| PassrelayError::InvalidKeyId {
            value: value.to_string(),
        })?;
        let bytes: [u8; KEY_ID_LEN] =
            decoded
                .try_into()
                .map_err(|_| PassrelayError::InvalidKeyId {
                    value: value.to_string(),
                })?;
        Ok(Self(bytes))
    }

    /// Short display form: the trailing four bytes, `0x`-prefixed.
    pub fn short(&self) -> String {
        format!("0x{}", hex::encode(&self.0[KEY_ID_LEN / 2..]))
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.0))
    }
}
