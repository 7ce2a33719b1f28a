use serde::{Deserialize, Serialize};

pub mod credentials;
pub mod endpoints;
pub mod util;

/// The only protocol version this library speaks.
pub const PROTOCOL_VERSION: &str = "003";

/// Sync endpoint used when the caller doesn't supply one.
pub const DEFAULT_SERVER: &str = "https://sync.standardnotes.org";

/// Maximum number of items requested or submitted with each sync call.
pub const PAGE_SIZE: usize = 110;

/// PBKDF2 iteration count used when registering a new account.
pub const DEFAULT_PW_COST: u32 = 110_000;

/// Anything below this is rejected for version "003" accounts.
pub const MIN_PW_COST: u32 = 100_000;

/// Wire format of `created_at` / `updated_at` timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A single item as stored by the server.
///
/// `content` and `enc_item_key` are five-field envelope strings
/// (`003:<auth_hash>:<uuid>:<iv_hex>:<base64_ciphertext>`); the server only
/// ever sees this form. Deleted items carry empty strings in both fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedItem {
    pub uuid: String,
    #[serde(default)]
    pub content: String,
    pub content_type: String,
    #[serde(default)]
    pub enc_item_key: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// A reference from one item to another, e.g. a tag referencing the notes
/// it applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReference {
    /// Unique identifier of the item being referenced.
    pub uuid: String,
    /// Content type of the item being referenced.
    pub content_type: String,
}

/// Constants an account needs to derive its keys, as returned by the
/// auth-params endpoint. Immutable per account until a password change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthParams {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub pw_salt: String,
    #[serde(default)]
    pub pw_cost: u32,
    #[serde(default)]
    pub pw_nonce: String,
    #[serde(default)]
    pub version: String,
}

/// Error body shape shared by the auth endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: ErrorPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorPayload {
    /// Field name the server expects an MFA token to be posted under.
    #[serde(default)]
    pub mfa_key: String,
}
