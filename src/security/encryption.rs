//! Passphrase-based AES-256-GCM for the cross-subdomain token handoff.
//!
//! The admin application encrypts a bearer token with a shared passphrase and
//! hands the result to the partner application in a URL. Both sides must agree
//! on every constant below; changing any of them breaks interoperability.
//!
//! ## Blob layout
//! `base64( salt[16] ‖ nonce[12] ‖ ciphertext ‖ tag[16] )`, standard alphabet
//! with padding.
//!
//! ## Key derivation
//! PBKDF2-HMAC-SHA256, 100 000 iterations, 256-bit output. Salt and nonce are
//! drawn from the OS CSPRNG on every call.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine};
use sha2::Sha256;
use std::fmt;

/// PBKDF2 salt size (16 bytes / 128 bits).
pub const SALT_LEN: usize = 16;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
pub const NONCE_LEN: usize = 12;

/// Derived key size (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;

/// GCM authentication tag size.
pub const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const HEADER_LEN: usize = SALT_LEN + NONCE_LEN;

/// Decoding accepts blobs with or without `=` padding.
const LENIENT_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);

/// Smallest decodable blob: header plus the tag of an empty plaintext.
const MIN_BLOB_LEN: usize = HEADER_LEN + TAG_LEN;

/// Failures of the handoff cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The blob is not base64, or too short to hold salt, nonce and tag.
    #[error("malformed handoff blob: {0}")]
    MalformedInput(String),

    /// The GCM tag did not verify: tampered blob or wrong passphrase.
    #[error("handoff blob failed authentication")]
    AuthenticationFailure,

    /// The cipher could not be initialised or sealing failed.
    #[error("handoff encryption failed: {0}")]
    Encryption(String),
}

impl CipherError {
    /// True for failures caused by the input blob rather than by this side.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CipherError::MalformedInput(_) | CipherError::AuthenticationFailure
        )
    }
}

/// A printable, self-contained encrypted value: salt, nonce, ciphertext, tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedBlob(String);

impl EncodedBlob {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EncodedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EncodedBlob {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EncodedBlob {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for EncodedBlob {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive a 256-bit AES key from a passphrase using PBKDF2-HMAC-SHA256.
fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn cipher_for(passphrase: &str, salt: &[u8]) -> Result<Aes256Gcm, CipherError> {
    let key = derive_key(passphrase, salt);
    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CipherError::Encryption(format!("AES cipher init failed: {e}")))
}

/// Encrypt `plaintext` under `passphrase`, returning a base64 blob.
///
/// Every call draws a fresh salt and nonce, so encrypting the same input twice
/// never yields the same blob.
pub fn encrypt(plaintext: &str, passphrase: &str) -> Result<EncodedBlob, CipherError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = cipher_for(passphrase, &salt)?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| CipherError::Encryption(format!("AES-256-GCM encryption failed: {e}")))?;

    let mut combined = Vec::with_capacity(HEADER_LEN + sealed.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&sealed);

    Ok(EncodedBlob(STANDARD.encode(&combined)))
}

/// Decrypt a blob produced by [`encrypt`] with the same passphrase.
///
/// Never returns partial plaintext: either the tag verifies and the whole
/// string comes back, or an error does.
pub fn decrypt(blob: &EncodedBlob, passphrase: &str) -> Result<String, CipherError> {
    let combined = decode_blob(blob.as_str())?;
    if combined.len() < MIN_BLOB_LEN {
        return Err(CipherError::MalformedInput(format!(
            "expected at least {MIN_BLOB_LEN} bytes, got {}",
            combined.len()
        )));
    }

    let (salt, rest) = combined.split_at(SALT_LEN);
    let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

    let cipher = cipher_for(passphrase, salt)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| CipherError::AuthenticationFailure)?;

    String::from_utf8(plaintext)
        .map_err(|_| CipherError::MalformedInput("plaintext is not valid UTF-8".into()))
}

fn decode_blob(encoded: &str) -> Result<Vec<u8>, CipherError> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(CipherError::MalformedInput("empty blob".into()));
    }

    // Form decoding of an unescaped query turns `+` into a space.
    let repaired = trimmed.replace(' ', "+");
    STANDARD_LENIENT
        .decode(&repaired)
        .or_else(|_| URL_SAFE_LENIENT.decode(&repaired))
        .map_err(|e| CipherError::MalformedInput(format!("invalid base64: {e}")))
}

/// Handoff cipher bound to one passphrase.
#[derive(Clone)]
pub struct HandoffCipher {
    passphrase: String,
}

impl HandoffCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncodedBlob, CipherError> {
        encrypt(plaintext, &self.passphrase)
    }

    pub fn decrypt(&self, blob: &EncodedBlob) -> Result<String, CipherError> {
        decrypt(blob, &self.passphrase)
    }
}

impl fmt::Debug for HandoffCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffCipher")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}
