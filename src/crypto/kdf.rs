use anyhow::{Context, Result};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::KEY_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            // PBKDF2-HMAC-SHA256 rounds
            iterations: 100_000,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32) -> anyhow::Result<Self> {
        let params = Self { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.iterations < 1 {
            anyhow::bail!("pbkdf2 iterations must be >= 1");
        }
        Ok(())
    }
}

/// Derive a field key from the passphrase and the salt stored with the blob.
///
/// Any passphrase is accepted, including the empty string.
pub fn derive_key(
    passphrase: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    kdf.validate().context("invalid PBKDF2 parameters")?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, kdf.iterations, &mut key[..]);

    Ok(key)
}

/// Salt-less SHA-256 key used by stores written before PBKDF2 was introduced.
///
/// Only used to read old blobs during migration.
pub fn derive_legacy_key(passphrase: &str) -> Zeroizing<[u8; KEY_LEN]> {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&digest);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(1_000).unwrap()
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; 16];

        let k1 = derive_key("password", &salt, fast()).unwrap();
        let k2 = derive_key("password", &salt, fast()).unwrap();

        assert_eq!(*k1, *k2);
    }

    #[test]
    fn salt_affects_output() {
        let k1 = derive_key("pw", &[1u8; 16], fast()).unwrap();
        let k2 = derive_key("pw", &[2u8; 16], fast()).unwrap();

        assert_ne!(*k1, *k2);
    }

    #[test]
    fn iterations_affect_output() {
        let salt = [7u8; 16];

        let k1 = derive_key("pw", &salt, KdfParams::new(1_000).unwrap()).unwrap();
        let k2 = derive_key("pw", &salt, KdfParams::new(2_000).unwrap()).unwrap();

        assert_ne!(*k1, *k2);
    }

    #[test]
    fn empty_passphrase_derives() {
        let key = derive_key("", &[0u8; 16], fast()).unwrap();
        assert_eq!(key.len(), KEY_LEN);
    }

    #[test]
    fn matches_rfc7914_vector() {
        // PBKDF2-HMAC-SHA256("passwd", "salt", 1) from RFC 7914 section 11
        let key = derive_key("passwd", b"salt", KdfParams::new(1).unwrap()).unwrap();
        assert_eq!(
            &key[..16],
            &[
                0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16, 0x91, 0xc2, 0x25, 0x44,
                0xb6, 0x05
            ]
        );
    }

    #[test]
    fn legacy_key_is_sha256_of_passphrase() {
        let key = derive_legacy_key("abc");
        assert_eq!(
            &key[..4],
            &[0xba, 0x78, 0x16, 0xbf],
            "SHA-256(\"abc\") starts with ba7816bf"
        );
    }

    #[test]
    fn kdf_invalid_params_fail_gracefully() {
        assert!(KdfParams::new(0).is_err());
    }

    #[test]
    fn default_uses_100k_iterations() {
        assert_eq!(KdfParams::default().iterations(), 100_000);
    }
}
