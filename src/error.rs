use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("incorrect master key")]
    WrongMasterKey,
    #[error("record {0} could not be decrypted")]
    CorruptRecord(i64),
    #[error("unrecognizable seed format")]
    MalformedTotpSeed,
    #[error("vault storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },
    #[error("vault is locked")]
    Locked,
    #[error("record {0} not found")]
    RecordNotFound(i64),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error(transparent)]
    Crypto(#[from] anyhow::Error),
}
