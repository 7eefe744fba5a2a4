//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Pack could not be decrypted with the given key (wrong or missing key)
    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    /// JSON or byte-layout violation
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Decrypted pack carries a type this implementation does not know
    #[error("unknown message type {0:?}")]
    UnknownMessageType(String),

    /// Command value outside the legal set of its property
    #[error("invalid value {value} for {property}")]
    InvalidCommandValue {
        /// Property name
        property: &'static str,
        /// Offending value as received
        value: String,
    },

    /// Binary frame trailer does not match the additive checksum
    #[error("checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    Checksum {
        /// Checksum computed over the frame body
        expected: u8,
        /// Checksum byte carried by the frame
        found: u8,
    },

    /// Binary frame too short for the status layout
    #[error("frame length {0} below status layout")]
    FrameLength(usize),
}

impl WireError {
    pub(crate) fn invalid(property: &'static str, value: impl ToString) -> Self {
        WireError::InvalidCommandValue {
            property,
            value: value.to_string(),
        }
    }
}
