//! Cryptography for the partner session handoff.

pub mod encryption;

pub use encryption::{
    decrypt, encrypt, CipherError, EncodedBlob, HandoffCipher, KEY_LEN, NONCE_LEN,
    PBKDF2_ITERATIONS, SALT_LEN, TAG_LEN,
};
