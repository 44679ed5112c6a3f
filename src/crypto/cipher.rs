//! Per-field AES-256-CBC encryption.
//!
//! Blob layout, base64 encoded:
//! ```text
//! SALT (16) | IV (16) | CIPHERTEXT (PKCS7 padded, multiple of 16)
//! ```
//!
//! Every call to [`FieldCipher::encrypt`] draws a fresh salt and IV, so equal
//! plaintexts never produce equal blobs.

use std::fmt;

use aes::Aes256;
use anyhow::{Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use getrandom::fill;
use zeroize::Zeroizing;

use super::kdf::{KdfParams, derive_key, derive_legacy_key};
use super::{BLOCK_LEN, IV_LEN, KEY_LEN, SALT_LEN};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Opaque decryption failure.
///
/// Malformed base64, bad padding and invalid UTF-8 all collapse into this one
/// value so callers cannot tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptError;

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid master key or corrupted data")
    }
}

impl std::error::Error for DecryptError {}

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| anyhow!("OS random generator unavailable"))
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate IV
pub fn generate_iv() -> Result<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;
    Ok(iv)
}

/// Encrypts and decrypts single text fields with a passphrase.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldCipher {
    kdf: KdfParams,
}

impl FieldCipher {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }

    /// Encrypt one field and return the base64 blob.
    pub fn encrypt(&self, passphrase: &str, plaintext: &str) -> Result<String> {
        let salt = generate_salt()?;
        let iv = generate_iv()?;
        let key = derive_key(passphrase, &salt, self.kdf)?;

        let ciphertext = encrypt_block_aligned(&key, &iv, plaintext.as_bytes())?;

        let mut blob = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`FieldCipher::encrypt`].
    pub fn decrypt(&self, passphrase: &str, blob: &str) -> Result<Zeroizing<String>, DecryptError> {
        let data = STANDARD.decode(blob.trim()).map_err(|_| DecryptError)?;
        if data.len() < SALT_LEN + IV_LEN + BLOCK_LEN {
            return Err(DecryptError);
        }

        let (salt, rest) = data.split_at(SALT_LEN);
        let (iv, ciphertext) = rest.split_at(IV_LEN);

        let key = derive_key(passphrase, salt, self.kdf).map_err(|_| DecryptError)?;
        decrypt_block_aligned(&key, iv, ciphertext)
    }

    /// Decrypt a pre-PBKDF2 blob (`IV (16) | CIPHERTEXT`, key = SHA-256 of the passphrase).
    pub fn decrypt_legacy(
        &self,
        passphrase: &str,
        blob: &str,
    ) -> Result<Zeroizing<String>, DecryptError> {
        let data = STANDARD.decode(blob.trim()).map_err(|_| DecryptError)?;
        if data.len() < IV_LEN + BLOCK_LEN {
            return Err(DecryptError);
        }

        let (iv, ciphertext) = data.split_at(IV_LEN);
        let key = derive_legacy_key(passphrase);
        decrypt_block_aligned(&key, iv, ciphertext)
    }
}

fn encrypt_block_aligned(key: &[u8; KEY_LEN], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| anyhow!("encryption failed"))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn decrypt_block_aligned(
    key: &[u8; KEY_LEN],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<String>, DecryptError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(DecryptError);
    }

    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| DecryptError)?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DecryptError)?,
    );

    let text = std::str::from_utf8(&plaintext).map_err(|_| DecryptError)?;
    Ok(Zeroizing::new(text.to_owned()))
}
