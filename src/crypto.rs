//! Password hashing and the encrypted envelope used for the data file.

use aes_gcm::aead::{rand_core::RngCore, Aead, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EmadError, EmadResult};

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;
const TAG_LEN: usize = 16;
const IV_LEN: usize = 12;
const SALT_LEN: usize = 16;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub v: u8,
    pub salt: String,
    pub iv: String,
    pub tag: String,
    pub data: String,
}

/// Salted PBKDF2 hash of a password.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub salt: String,
    pub hash: String,
    #[serde(default = "default_pbkdf2_iterations")]
    pub iterations: u32,
}

impl Credential {
    pub fn new(password: &str, iterations: u32) -> Self {
        let iterations = iterations.max(1);
        let salt = random_salt();
        let key = derive_key(password, &salt, iterations);
        Credential {
            salt: encode_b64(&salt),
            hash: encode_b64(key.as_slice()),
            iterations,
        }
    }

    pub fn verify(&self, password: &str) -> bool {
        if password.is_empty() || self.hash.is_empty() {
            return false;
        }
        let Ok(salt) = decode_b64(self.salt.as_str()) else {
            return false;
        };
        let Ok(expected) = decode_b64(self.hash.as_str()) else {
            return false;
        };
        let key = derive_key(password, salt.as_slice(), self.iterations.max(1));
        constant_time_eq(key.as_slice(), expected.as_slice())
    }
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn encrypt_text_with_key(text: &str, salt: &[u8], key: &[u8; 32]) -> EmadResult<Envelope> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let cipher =
        Aes256Gcm::new_from_slice(key.as_slice()).map_err(|err| EmadError::Crypto(err.to_string()))?;
    let nonce = Nonce::from_slice(&iv);
    let encrypted = cipher
        .encrypt(nonce, text.as_bytes())
        .map_err(|err| EmadError::Crypto(err.to_string()))?;

    if encrypted.len() < TAG_LEN {
        return Err(EmadError::Crypto("Encryption output too short.".to_string()));
    }
    let (data, tag) = encrypted.split_at(encrypted.len() - TAG_LEN);

    Ok(Envelope {
        v: 1,
        salt: encode_b64(salt),
        iv: encode_b64(&iv),
        tag: encode_b64(tag),
        data: encode_b64(data),
    })
}

pub fn encrypt_text(text: &str, password: &str, iterations: u32) -> EmadResult<Envelope> {
    let salt = random_salt();
    let key = derive_key(password, &salt, iterations);
    encrypt_text_with_key(text, &salt, &key)
}

/// Returns `None` when the envelope is malformed or the key does not match.
pub fn decrypt_envelope_with_key(envelope: &Envelope, key: &[u8; 32]) -> Option<String> {
    let iv = decode_b64(envelope.iv.as_str()).ok()?;
    let tag = decode_b64(envelope.tag.as_str()).ok()?;
    let data = decode_b64(envelope.data.as_str()).ok()?;
    if iv.len() != IV_LEN || tag.is_empty() {
        return None;
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).ok()?;
    let nonce = Nonce::from_slice(iv.as_slice());
    let mut combined = Vec::with_capacity(data.len() + tag.len());
    combined.extend_from_slice(data.as_slice());
    combined.extend_from_slice(tag.as_slice());

    let decrypted = cipher.decrypt(nonce, combined.as_slice()).ok()?;
    String::from_utf8(decrypted).ok()
}

pub fn decrypt_envelope(envelope: &Envelope, password: &str, iterations: u32) -> Option<String> {
    let salt = decode_b64(envelope.salt.as_str()).ok()?;
    let key = derive_key(password, salt.as_slice(), iterations);
    decrypt_envelope_with_key(envelope, &key)
}

/// Cache key for a password; never stored on disk.
pub fn password_fingerprint(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    encode_b64(hasher.finalize().as_ref())
}

pub fn new_id(prefix: &str) -> String {
    let mut bytes = [0_u8; 10];
    OsRng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}-{}-{hex}", chrono::Utc::now().timestamp_millis())
}

pub fn decode_b64(value: &str) -> EmadResult<Vec<u8>> {
    B64.decode(value)
        .map_err(|err| EmadError::Crypto(err.to_string()))
}

pub fn encode_b64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
