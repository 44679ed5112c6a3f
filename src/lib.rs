//! Local password vault.
//!
//! Records are stored as independently encrypted fields
//! (PBKDF2-HMAC-SHA256 + AES-256-CBC, fresh salt and IV per field) in a
//! SQLite table. A [`VaultSession`] holds the master passphrase while
//! unlocked and is the only entry point a UI needs.

pub mod crypto;
mod error;
pub mod generator;
mod record;
mod session;
mod store;
pub mod totp;

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

pub use crate::crypto::{DecryptError, FieldCipher, KdfParams};
pub use crate::error::VaultError;
pub use crate::generator::{CharClasses, generate_password};
pub use crate::record::{Field, Record, RecordFields, WELCOME_ID};
pub use crate::session::{SessionConfig, SessionEvents, SessionState, Unlock, VaultSession};
pub use crate::store::{EncryptedFields, Loaded, MigrationReport, VaultStore};

/// Platform data directory location of the vault database.
pub fn default_store_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "lockbox").context("could not determine platform directories")?;

    Ok(project_dirs.data_dir().join("lockbox.db"))
}
