use {
    anyhow::{bail, ensure},
    rand::distributions::{Alphanumeric, DistString},
    std::fmt::{self, Debug},
    zeroize::{Zeroize, ZeroizeOnDrop},
};

/// Length of one hex-encoded key (a third of the stretched output).
pub const KEY_HEX_LENGTH: usize = 64;

/// Length of the `pw_nonce` generated at registration.
pub const PW_NONCE_LENGTH: usize = 65;

/// The triple derived from a user password.
///
/// `pw` is what the server is shown in place of the password; `mk` unwraps
/// per-item keys and `ak` authenticates envelopes. The server never sees
/// `mk` or `ak`. All three are wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySet {
    pw: String,
    mk: String,
    ak: String,
}

impl KeySet {
    /// Hex-encodes stretched key material and splits it into its three
    /// equal thirds.
    pub fn from_stretched_bytes(stretched: &[u8]) -> Self {
        let hex_len = stretched.len() * 2 / 3;
        let mut encoded = hex::encode(stretched);
        let ak = encoded.split_off(hex_len * 2);
        let mk = encoded.split_off(hex_len);
        Self {
            pw: encoded,
            mk,
            ak,
        }
    }

    /// Splits the hex encoding of the stretched key into its three equal
    /// thirds.
    pub fn from_stretched_hex(stretched: &str) -> anyhow::Result<Self> {
        ensure!(
            stretched.len() == KEY_HEX_LENGTH * 3,
            "invalid stretched key length; got {}, expected {}",
            stretched.len(),
            KEY_HEX_LENGTH * 3,
        );
        if let Some(c) = stretched.chars().find(|c| !c.is_ascii_hexdigit()) {
            bail!("stretched key must be hex but contains invalid character `{c}`");
        }
        Ok(Self {
            pw: stretched[..KEY_HEX_LENGTH].to_owned(),
            mk: stretched[KEY_HEX_LENGTH..KEY_HEX_LENGTH * 2].to_owned(),
            ak: stretched[KEY_HEX_LENGTH * 2..].to_owned(),
        })
    }

    pub fn pw(&self) -> &str {
        &self.pw
    }

    pub fn mk(&self) -> &str {
        &self.mk
    }

    pub fn ak(&self) -> &str {
        &self.ak
    }
}

impl Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet").finish()
    }
}

/// Everything sync calls need: where to talk, how to authenticate, and the
/// keys to open what comes back. Created at sign-in, discarded by the
/// caller; key material is wiped on drop.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    #[zeroize(skip)]
    pub server: String,
    pub token: String,
    pub mk: String,
    pub ak: String,
}

impl Session {
    /// A session is usable only if all four fields are present.
    pub fn valid(&self) -> bool {
        !self.server.is_empty()
            && !self.token.is_empty()
            && !self.mk.is_empty()
            && !self.ak.is_empty()
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Random alphanumeric `pw_nonce` for a new registration. Not key
/// material, so the thread-local generator is fine here.
pub fn generate_pw_nonce() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), PW_NONCE_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_set_splits_into_thirds() {
        let stretched: String = "0123456789abcdef".repeat(12);
        let keys = KeySet::from_stretched_hex(&stretched).unwrap();
        assert_eq!(keys.pw().len(), KEY_HEX_LENGTH);
        assert_eq!(keys.mk().len(), KEY_HEX_LENGTH);
        assert_eq!(keys.ak().len(), KEY_HEX_LENGTH);
        assert_eq!(format!("{}{}{}", keys.pw(), keys.mk(), keys.ak()), stretched);
    }

    #[test]
    fn key_set_from_bytes_matches_hex_form() {
        let bytes: Vec<u8> = (0..96u8).collect();
        let from_bytes = KeySet::from_stretched_bytes(&bytes);
        let from_hex = KeySet::from_stretched_hex(&hex::encode(&bytes)).unwrap();
        assert_eq!(from_bytes.pw(), from_hex.pw());
        assert_eq!(from_bytes.mk(), from_hex.mk());
        assert_eq!(from_bytes.ak(), from_hex.ak());
    }

    #[test]
    fn key_set_rejects_bad_input() {
        assert!(KeySet::from_stretched_hex("abc").is_err());
        assert!(KeySet::from_stretched_hex(&"z".repeat(192)).is_err());
    }

    #[test]
    fn secrets_are_masked() {
        let keys = KeySet::from_stretched_hex(&"ab".repeat(96)).unwrap();
        assert!(!format!("{keys:?}").contains("ab"));

        let session = Session {
            server: "https://example.org".into(),
            token: "token".into(),
            mk: "a".repeat(64),
            ak: "b".repeat(64),
        };
        let debug = format!("{session:?}");
        assert!(debug.contains("example.org"));
        assert!(!debug.contains("token"));
        assert!(!debug.contains(&"a".repeat(64)));
    }

    #[test]
    fn session_validity() {
        let mut session = Session {
            server: "https://example.org".into(),
            token: "token".into(),
            mk: "a".repeat(64),
            ak: "b".repeat(64),
        };
        assert!(session.valid());
        session.token.clear();
        assert!(!session.valid());
    }

    #[test]
    fn pw_nonce_shape() {
        let nonce = generate_pw_nonce();
        assert_eq!(nonce.len(), PW_NONCE_LENGTH);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(nonce, generate_pw_nonce());
    }
}
