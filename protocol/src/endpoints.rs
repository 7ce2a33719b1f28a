use {
    crate::{util::strip_line_break, EncryptedItem},
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Remote path for fetching the key-derivation parameters of an account.
pub const AUTH_PARAMS_PATH: &str = "/auth/params";
/// Remote path for registering a new account.
pub const REGISTER_PATH: &str = "/auth";
/// Remote path for exchanging credentials for a bearer token.
pub const SIGN_IN_PATH: &str = "/auth/sign_in";
/// Remote path for item sync calls.
pub const SYNC_PATH: &str = "/items/sync";

/// Body of a `POST /items/sync` call.
///
/// Tokens echoed back to the server are newline-terminated on the wire;
/// the constructors strip any stray newline first so a token is never
/// terminated twice. Retrieval continuations distinguish "no cursor yet"
/// (field omitted), "server said null" (JSON `null`), and a concrete
/// cursor.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<EncryptedItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_token: Option<Option<String>>,
}

impl SyncRequest {
    /// Initial retrieval call: only a limit.
    pub fn first_page(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            items: None,
            sync_token: None,
            cursor_token: None,
        }
    }

    /// Retrieval continuation. `cursor` is `None` when the server returned
    /// the literal string "null".
    pub fn next_page(limit: usize, sync_token: &str, cursor: Option<&str>) -> Self {
        Self {
            limit: Some(limit),
            items: Some(Vec::new()),
            sync_token: Some(wire_token(sync_token)),
            cursor_token: Some(cursor.map(wire_token)),
        }
    }

    /// Submission of modified items together with the current sync token.
    pub fn submit(items: Vec<EncryptedItem>, sync_token: &str) -> Self {
        Self {
            limit: None,
            items: Some(items),
            sync_token: Some(strip_line_break(sync_token).to_owned()),
            cursor_token: None,
        }
    }
}

/// Newline-terminated token form expected by the sync endpoint.
fn wire_token(token: &str) -> String {
    let mut token = strip_line_break(token).to_owned();
    token.push('\n');
    token
}

/// Body of a sync response. Every array may be absent or empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    /// Items new or modified since the last sync.
    #[serde(default)]
    pub retrieved_items: Vec<EncryptedItem>,
    /// Items the server saved during this call.
    #[serde(default)]
    pub saved_items: Vec<EncryptedItem>,
    /// Items the server could not save.
    #[serde(default)]
    pub unsaved: Vec<EncryptedItem>,
    #[serde(default)]
    pub sync_token: String,
    #[serde(default)]
    pub cursor_token: Option<String>,
}

/// Body of a `POST /auth/sign_in` call. The optional MFA token is posted
/// under whatever field name the server announced in its challenge, hence
/// the flattened map.
#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub password: String,
    pub email: String,
    #[serde(flatten)]
    pub mfa: BTreeMap<String, String>,
}

impl SignInRequest {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            password: password.to_owned(),
            email: email.to_owned(),
            mfa: BTreeMap::new(),
        }
    }

    pub fn with_mfa(mut self, token_name: &str, token_value: &str) -> Self {
        self.mfa
            .insert(token_name.to_owned(), token_value.to_owned());
        self
    }
}

/// Successful response to sign-in and registration calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInResponse {
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub email: String,
}

/// Body of a `POST /auth` registration call.
///
/// `pw_cost` is a decimal string; the reference server accepts the quoted
/// form and it keeps the body identical to existing clients.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub identifier: String,
    pub password: String,
    pub pw_cost: String,
    pub pw_nonce: String,
    pub version: String,
}
