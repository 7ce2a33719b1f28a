//! Crypto layer of the "003" protocol.
//!
//! A user password is stretched with PBKDF2-HMAC-SHA512 into three
//! hex-encoded keys: `pw` (shown to the server in place of the password),
//! `mk` (master key) and `ak` (auth key).
//!
//! Every item gets its own random 64-byte key. Its hex encoding splits into
//! an encryption half and an authentication half; the item content is
//! AES-256-CBC encrypted under the first and HMAC-SHA256 authenticated
//! under the second. The item key itself is then encrypted the same way
//! under (`mk`, `ak`). Both authentications cover the item uuid, so an
//! envelope taken from one item never verifies against another.
//!
//! Envelopes are five colon-delimited fields:
//! `003:<auth_hash>:<uuid>:<iv_hex>:<base64_ciphertext>`.

mod cipher;
mod keys;

pub use cipher::{
    decrypt_string, encrypt_string, generate_item_key, split_item_key, IV_LENGTH, ITEM_KEY_LENGTH,
};
pub use keys::derive_key_set;
