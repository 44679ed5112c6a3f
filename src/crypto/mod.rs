//! Cryptographic primitives for the vault.
//!
//! Provides key derivation and per-field encryption.

pub mod cipher;
pub mod kdf;

pub use cipher::{DecryptError, FieldCipher, generate_iv, generate_salt};
pub use kdf::{KdfParams, derive_key, derive_legacy_key};

/// Length of the per-encryption salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the CBC initialization vector (16 bytes, one AES block).
pub const IV_LEN: usize = 16;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// AES block size.
pub const BLOCK_LEN: usize = 16;
