//! Client SDK for the Standard Notes "003" encrypted sync protocol.
//!
//! The server only ever stores ciphertext: keys are derived from the user
//! password ([`crypto::derive_key_set`]), items are enveloped per-item
//! ([`items`]), and a [`Client`] signs in, registers, and exchanges
//! envelopes with the sync endpoint using cursor-paged retrieval and
//! size-adaptive submission. Decrypted items can be narrowed with the
//! [`filter`] engine.
//!
//! All operations are blocking; a [`Session`] must not be used from two
//! sync calls at once, since the server's sync token orders them.
//!
//! ```no_run
//! use snsync_sdk::{Client, GetItemsInput, SignInInput};
//!
//! # fn main() -> snsync_sdk::Result<()> {
//! let client = Client::new();
//! let output = client.sign_in(SignInInput {
//!     email: "soba@lessknown.co.uk".into(),
//!     password: "correct horse battery staple".into(),
//!     ..SignInInput::default()
//! })?;
//! if let Some(_token_name) = output.token_name {
//!     // prompt for the MFA token and sign in again with it
//!     return Ok(());
//! }
//! let items = client.get_items(GetItemsInput {
//!     session: output.session.clone(),
//!     ..GetItemsInput::default()
//! })?;
//! let _notes = snsync_sdk::items::decrypt_and_parse(
//!     &items.retrieved_items,
//!     &output.session.mk,
//!     &output.session.ak,
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod content;
pub mod crypto;
mod error;
pub mod filter;
pub mod items;

pub use {
    client::{
        Client, GetItemsInput, GetItemsOutput, HttpRequest, HttpResponse, PutItemsInput,
        PutItemsOutput, RegisterInput, SignInInput, SignInOutput, Transport,
    },
    error::{Error, Result},
    snsync_protocol::credentials::Session,
};

pub use snsync_protocol as protocol;
