use {
    crate::error::{Error, Result},
    aes::{
        cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit},
        Aes256,
    },
    base64::{prelude::BASE64_STANDARD, Engine},
    hmac::{Hmac, Mac},
    rand::{rngs::OsRng, RngCore},
    sha2::Sha256,
    snsync_protocol::PROTOCOL_VERSION,
    zeroize::Zeroize,
};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// CBC initialization vector length.
pub const IV_LENGTH: usize = 16;

/// Random bytes drawn for each per-item key. Hex-encoded it splits into an
/// encryption half and an authentication half.
pub const ITEM_KEY_LENGTH: usize = 64;

/// Fresh random item key, hex-encoded.
pub fn generate_item_key() -> String {
    let mut bytes = [0u8; ITEM_KEY_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    let key = hex::encode(bytes);
    bytes.zeroize();
    key
}

/// Splits a hex item key into its (encryption, authentication) halves.
pub fn split_item_key(item_key: &str) -> (&str, &str) {
    item_key.split_at(item_key.len() / 2)
}

/// Encrypts a plaintext string into a five-field envelope bound to `uuid`.
///
/// The ciphertext is AES-256-CBC under the hex-decoded `enc_key` with a
/// random IV, and the envelope is authenticated with HMAC-SHA256 under the
/// hex-decoded `auth_key` over everything except the authenticator itself.
/// `iv_override` pins the IV for reproducible output.
pub fn encrypt_string(
    plaintext: &str,
    enc_key: &str,
    auth_key: &str,
    uuid: &str,
    iv_override: Option<[u8; IV_LENGTH]>,
) -> Result<String> {
    let mut key = decode_hex(enc_key, "encryption key")?;

    let iv = iv_override.unwrap_or_else(|| {
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);
        iv
    });

    let cipher = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|err| Error::MalformedEnvelope(format!("invalid encryption key: {err}")))?;
    key.zeroize();
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let iv_hex = hex::encode(iv);
    let ciphertext_b64 = BASE64_STANDARD.encode(ciphertext);
    let to_auth = format!("{PROTOCOL_VERSION}:{uuid}:{iv_hex}:{ciphertext_b64}");
    let auth_hash = hex::encode(compute_auth_hash(auth_key, &to_auth)?);

    Ok(format!(
        "{PROTOCOL_VERSION}:{auth_hash}:{uuid}:{iv_hex}:{ciphertext_b64}",
    ))
}

/// Verifies and decrypts a five-field envelope back to its plaintext.
///
/// Refuses envelopes whose embedded uuid differs from `uuid`, and verifies
/// the authenticator (constant-time) before touching the ciphertext.
pub fn decrypt_string(envelope: &str, enc_key: &str, auth_key: &str, uuid: &str) -> Result<String> {
    let components: Vec<&str> = envelope.split(':').collect();
    let &[version, auth_hash, envelope_uuid, iv_hex, ciphertext_b64] = components.as_slice() else {
        return Err(Error::MalformedEnvelope(format!(
            "expected 5 fields, got {}",
            components.len(),
        )));
    };

    if envelope_uuid != uuid {
        return Err(Error::UuidMismatch);
    }

    let to_auth = format!("{version}:{envelope_uuid}:{iv_hex}:{ciphertext_b64}");
    let expected = decode_hex(auth_hash, "auth hash")?;
    let mut mac = new_mac(auth_key)?;
    mac.update(to_auth.as_bytes());
    mac.verify_slice(&expected).map_err(|_| Error::AuthFailure)?;

    let mut key = decode_hex(enc_key, "encryption key")?;
    let iv = decode_hex(iv_hex, "iv")?;
    let ciphertext = BASE64_STANDARD
        .decode(ciphertext_b64)
        .map_err(|err| Error::MalformedEnvelope(format!("bad base64 ciphertext: {err}")))?;

    let cipher = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|err| Error::MalformedEnvelope(format!("invalid encryption key or iv: {err}")))?;
    key.zeroize();
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Error::MalformedEnvelope("bad padding".into()))?;

    String::from_utf8(plaintext)
        .map_err(|err| Error::MalformedEnvelope(format!("plaintext is not utf-8: {err}")))
}

fn new_mac(auth_key: &str) -> Result<HmacSha256> {
    let mut key = decode_hex(auth_key, "auth key")?;
    let mac = <HmacSha256 as Mac>::new_from_slice(&key)
        .map_err(|err| Error::MalformedEnvelope(format!("invalid auth key: {err}")))?;
    key.zeroize();
    Ok(mac)
}

fn compute_auth_hash(auth_key: &str, to_auth: &str) -> Result<Vec<u8>> {
    let mut mac = new_mac(auth_key)?;
    mac.update(to_auth.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn decode_hex(input: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(input).map_err(|err| Error::MalformedEnvelope(format!("bad hex {what}: {err}")))
}
