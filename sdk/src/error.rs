//! Error sum for every operation in the SDK.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between a password and a synced item set.
#[derive(Error, Debug)]
pub enum Error {
    /// Version "003" accounts require at least 100 000 PBKDF2 iterations.
    #[error("password cost {0} is too low")]
    WeakCost(u32),

    /// The uuid embedded in an envelope does not match the item it arrived
    /// on. Envelopes cannot be swapped between items.
    #[error("envelope uuid is not equal to item uuid")]
    UuidMismatch,

    /// HMAC mismatch on decryption.
    #[error("auth hash does not match; possible tampering or server issue")]
    AuthFailure,

    /// Field count, hex, base64, padding, or UTF-8 failure while decoding
    /// an envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// An item failed validation before submission; carries the rule that
    /// failed.
    #[error("failed to create \"{content_type}\": {reason}")]
    InvalidItem {
        content_type: String,
        reason: String,
    },

    /// The server answered with a status this library does not handle.
    #[error("unhandled server status: {0}")]
    UnhandledStatus(u16),

    /// The server rejected the request body as oversized (413 or an
    /// equivalent error message).
    #[error("413: request entity too large")]
    RequestEntityTooLarge,

    /// The server wants an MFA token posted under the named field.
    #[error("multi-factor token required under field \"{0}\"")]
    MfaRequired(String),

    /// Sign-in was refused; the message is the server's, lowercased.
    #[error("{0}")]
    BadCredentials(String),

    #[error("email is already registered")]
    EmailAlreadyRegistered,

    #[error("email address not recognised")]
    EmailNotRecognised,

    #[error("cannot resolve host")]
    CannotResolveHost,

    #[error("server url is missing a protocol scheme")]
    MissingProtocol,

    /// Connecting took longer than the configured limit, in seconds.
    #[error("connection timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("connection refused")]
    ConnectRefused,

    /// An item submission exhausted its retry budget mid-batch.
    #[error("failed to put all items")]
    PartialPutFailure,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport failure that matched none of the connection
    /// classifications.
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Whether the sync layer should react by shrinking the payload.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, Self::RequestEntityTooLarge)
            || self.to_string().to_lowercase().contains("too large")
    }
}
