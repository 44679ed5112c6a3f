//! Session state machine: holds the master key while unlocked and routes all
//! reads and writes through the store.

use std::fmt;
use std::path::Path;

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::{FieldCipher, KdfParams};
use crate::error::VaultError;
use crate::record::{Field, Record, RecordFields};
use crate::store::{EncryptedFields, Loaded, MigrationReport, VaultStore};
use crate::totp;

/// Timer and KDF settings for a session. All durations are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub idle_timeout_secs: u32,
    pub clipboard_clear_secs: u32,
    pub wrong_key_notice_secs: u32,
    pub kdf: KdfParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            clipboard_clear_secs: 10,
            wrong_key_notice_secs: 5,
            kdf: KdfParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked,
}

/// What the host has to act on after a transition or a tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvents {
    /// The session went from unlocked to locked.
    pub locked: bool,
    /// The clipboard must be overwritten with an empty value now.
    pub clear_clipboard: bool,
}

/// Successful unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlock {
    /// The vault has no records yet; the passphrase becomes the master key.
    FirstUse,
    /// Existing records decrypted with the passphrase.
    Opened { records: usize },
}

pub struct VaultSession {
    store: VaultStore,
    config: SessionConfig,
    master_key: Option<Zeroizing<String>>,
    records: Vec<Record>,
    idle_remaining: u32,
    clipboard_remaining: u32,
    wrong_key_remaining: u32,
    // a reload relocked the session while a copy was pending
    pending_clear: bool,
}

impl fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSession")
            .field("state", &self.state())
            .field("master_key", &"[REDACTED]")
            .field("records", &self.records.len())
            .finish()
    }
}

impl VaultSession {
    pub fn new(store: VaultStore, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            master_key: None,
            records: Vec::new(),
            idle_remaining: config.idle_timeout_secs,
            clipboard_remaining: 0,
            wrong_key_remaining: 0,
            pending_clear: false,
        }
    }

    /// Opens the store at `path` with the session's KDF settings.
    pub fn open(path: &Path, config: SessionConfig) -> Result<Self, VaultError> {
        let store = VaultStore::open(path, FieldCipher::new(config.kdf))?;
        Ok(Self::new(store, config))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.master_key.is_some() {
            SessionState::Unlocked
        } else {
            SessionState::Locked
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == SessionState::Unlocked
    }

    /// True when the store holds no records, whatever the passphrase.
    pub fn is_first_use(&self) -> Result<bool, VaultError> {
        Ok(self.store.count()? == 0)
    }

    pub fn unlock(&mut self, passphrase: Zeroizing<String>) -> Result<Unlock, VaultError> {
        self.discard_key();

        let outcome = match self.store.load_all(&passphrase)? {
            Loaded::WrongKey => {
                self.wrong_key_remaining = self.config.wrong_key_notice_secs;
                return Err(VaultError::WrongMasterKey);
            }
            Loaded::Empty => Unlock::FirstUse,
            Loaded::Records(records) => {
                let count = records.len();
                self.set_records(records);
                Unlock::Opened { records: count }
            }
        };

        self.master_key = Some(passphrase);
        self.wrong_key_remaining = 0;
        self.idle_remaining = self.config.idle_timeout_secs;
        info!(records = self.records.len(), "vault unlocked");
        Ok(outcome)
    }

    /// Discards the master key and all decrypted records.
    pub fn lock(&mut self) -> SessionEvents {
        let was_unlocked = self.is_unlocked();
        self.discard_key();

        let clear_clipboard = self.clipboard_remaining > 0 || self.pending_clear;
        self.clipboard_remaining = 0;
        self.pending_clear = false;

        if was_unlocked {
            info!("vault locked");
        }
        SessionEvents {
            locked: was_unlocked,
            clear_clipboard,
        }
    }

    fn discard_key(&mut self) {
        self.master_key = None;
        self.records.clear();
    }

    fn key(&self) -> Result<&str, VaultError> {
        self.master_key
            .as_deref()
            .map(String::as_str)
            .ok_or(VaultError::Locked)
    }

    /// Decrypted records, sorted by title.
    pub fn list_records(&self) -> Result<&[Record], VaultError> {
        self.key()?;
        Ok(&self.records)
    }

    pub fn record(&self, id: i64) -> Result<&Record, VaultError> {
        self.list_records()?
            .iter()
            .find(|r| r.id() == id)
            .ok_or(VaultError::RecordNotFound(id))
    }

    pub fn create_record(&mut self, fields: &RecordFields) -> Result<i64, VaultError> {
        let sealed = self.seal(fields)?;
        let id = self.store.insert(&sealed)?;
        self.reload()?;
        Ok(id)
    }

    /// Writes `fields` over record `id`.
    ///
    /// A field equal to its loaded plaintext keeps its stored blob. A corrupt
    /// field keeps its blob unless a non-empty replacement is given.
    pub fn update_record(&mut self, id: i64, fields: &RecordFields) -> Result<(), VaultError> {
        let sealed = {
            let key = self.key()?;
            let mut blobs = self
                .store
                .fetch(id)?
                .ok_or(VaultError::RecordNotFound(id))?;
            let loaded = self.records.iter().find(|r| r.id() == id);

            for field in Field::ALL {
                let value = fields.get(field);
                let keep = loaded.is_some_and(|record| {
                    if record.corrupt_fields().contains(&field) {
                        value.is_empty()
                    } else {
                        record.get(field) == value
                    }
                });
                if keep {
                    continue;
                }
                blobs.set(field, self.store.cipher().encrypt(key, value)?);
            }
            blobs
        };

        self.store.update(id, &sealed)?;
        self.reload()
    }

    pub fn delete_record(&mut self, id: i64) -> Result<(), VaultError> {
        self.key()?;
        self.store.delete(id)?;
        self.reload()
    }

    fn seal(&self, fields: &RecordFields) -> Result<EncryptedFields, VaultError> {
        let key = self.key()?;
        Ok(EncryptedFields::seal(self.store.cipher(), key, fields)?)
    }

    fn reload(&mut self) -> Result<(), VaultError> {
        let loaded = self.store.load_all(self.key()?)?;
        match loaded {
            Loaded::Empty => self.records.clear(),
            Loaded::Records(records) => self.set_records(records),
            Loaded::WrongKey => {
                // first row no longer matches the session key
                warn!("vault contents changed under the session key");
                let events = self.lock();
                self.pending_clear = events.clear_clipboard;
                return Err(VaultError::WrongMasterKey);
            }
        }
        Ok(())
    }

    fn set_records(&mut self, mut records: Vec<Record>) {
        records.sort_by_cached_key(|r| r.title().to_lowercase());
        self.records = records;
    }

    /// Index of the last record, in title order, whose title starts with
    /// `prefix`, ignoring case.
    pub fn find_by_title_prefix(&self, prefix: &str) -> Option<usize> {
        let prefix = prefix.to_lowercase();
        self.records
            .iter()
            .rposition(|r| r.title().to_lowercase().starts_with(&prefix))
    }

    pub fn position_of(&self, id: i64) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Current code for `seed`, or the malformed-seed placeholder.
    pub fn current_totp_code(&self, seed: &str) -> String {
        totp::generate(seed)
    }

    /// Current code for a record; `None` when 2FA is disabled for it.
    pub fn totp_for(&self, id: i64) -> Result<Option<String>, VaultError> {
        let record = self.record(id)?;
        if record.corrupt_fields().contains(&Field::TotpSeed) {
            return Err(VaultError::CorruptRecord(id));
        }
        if !record.has_totp() {
            return Ok(None);
        }
        totp::generate_at(record.totp_seed(), totp::now_unix())
            .map(Some)
            .map_err(|_| VaultError::MalformedTotpSeed)
    }

    /// Returns a field's plaintext for the clipboard and starts the clear countdown.
    pub fn copy_field(&mut self, id: i64, field: Field) -> Result<Zeroizing<String>, VaultError> {
        let record = self.record(id)?;
        if record.corrupt_fields().contains(&field) {
            return Err(VaultError::CorruptRecord(id));
        }

        let value = match field {
            Field::TotpSeed => match self.totp_for(id)? {
                Some(code) => code,
                None => String::new(),
            },
            _ => record.get(field).to_string(),
        };

        self.clipboard_remaining = self.config.clipboard_clear_secs;
        Ok(Zeroizing::new(value))
    }

    /// Reset the idle countdown; call on every input event.
    pub fn touch(&mut self) {
        self.idle_remaining = self.config.idle_timeout_secs;
    }

    /// Advance all countdowns by one second of wall-clock time.
    pub fn tick(&mut self) -> SessionEvents {
        let mut events = SessionEvents::default();

        if self.clipboard_remaining > 0 {
            self.clipboard_remaining -= 1;
            events.clear_clipboard = self.clipboard_remaining == 0;
        }
        if self.pending_clear {
            self.pending_clear = false;
            events.clear_clipboard = true;
        }

        self.wrong_key_remaining = self.wrong_key_remaining.saturating_sub(1);

        if self.is_unlocked() {
            self.idle_remaining = self.idle_remaining.saturating_sub(1);
            if self.idle_remaining == 0 {
                info!("idle timeout reached");
                let locked = self.lock();
                events.locked = locked.locked;
                events.clear_clipboard |= locked.clear_clipboard;
                self.idle_remaining = self.config.idle_timeout_secs;
            }
        }

        events
    }

    /// True while the "incorrect master key" message should be shown.
    pub fn wrong_key_notice(&self) -> bool {
        self.wrong_key_remaining > 0
    }

    /// Seconds until the clipboard is cleared, if a copy is pending.
    pub fn clipboard_countdown(&self) -> Option<u32> {
        (self.clipboard_remaining > 0).then_some(self.clipboard_remaining)
    }

    pub fn idle_remaining(&self) -> u32 {
        self.idle_remaining
    }

    /// Rewrites legacy-format fields. Works while locked, since legacy data
    /// cannot pass the unlock check.
    pub fn migrate_legacy(&mut self, passphrase: &str) -> Result<MigrationReport, VaultError> {
        let report = self.store.migrate_legacy(passphrase)?;
        if self.is_unlocked() {
            self.reload()?;
        }
        Ok(report)
    }
}
