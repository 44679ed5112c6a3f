//! SQLite-backed record storage.
//!
//! Every text column holds a blob produced by [`FieldCipher::encrypt`]; the
//! store never sees plaintext.

use std::fs;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::FieldCipher;
use crate::error::VaultError;
use crate::record::{Field, Record, RecordFields};

const CREATE_ENTRIES: &str = "CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    totp_seed TEXT NOT NULL DEFAULT ''
)";

/// Encrypted blobs for the four columns of one row.
#[derive(Debug, Clone)]
pub struct EncryptedFields {
    pub title: String,
    pub username: String,
    pub password: String,
    pub totp_seed: String,
}

impl EncryptedFields {
    /// Encrypt every field independently, each with its own salt and IV.
    pub fn seal(
        cipher: &FieldCipher,
        passphrase: &str,
        fields: &RecordFields,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            title: cipher.encrypt(passphrase, &fields.title)?,
            username: cipher.encrypt(passphrase, &fields.username)?,
            password: cipher.encrypt(passphrase, &fields.password)?,
            totp_seed: cipher.encrypt(passphrase, &fields.totp_seed)?,
        })
    }

    pub(crate) fn get(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Username => &self.username,
            Field::Password => &self.password,
            Field::TotpSeed => &self.totp_seed,
        }
    }

    pub(crate) fn set(&mut self, field: Field, blob: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Username => &mut self.username,
            Field::Password => &mut self.password,
            Field::TotpSeed => &mut self.totp_seed,
        };
        *slot = blob;
    }
}

/// Result of [`VaultStore::load_all`].
#[derive(Debug)]
pub enum Loaded {
    /// No rows yet; any passphrase is accepted.
    Empty,
    /// The first row's title did not decrypt with the passphrase.
    WrongKey,
    Records(Vec<Record>),
}

/// Outcome of [`VaultStore::migrate_legacy`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Fields rewritten from the legacy format.
    pub migrated: usize,
    /// Fields already in the current format.
    pub current: usize,
    /// Fields readable in neither format.
    pub unreadable: usize,
}

pub struct VaultStore {
    conn: Connection,
    cipher: FieldCipher,
}

impl VaultStore {
    /// Opens (or creates) the store file and ensures the schema exists.
    ///
    /// Parent directories are created if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::StorageUnavailable`] if the database cannot be opened.
    pub fn open(path: &Path, cipher: FieldCipher) -> Result<Self, VaultError> {
        let unavailable = |reason: String| VaultError::StorageUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| unavailable(e.to_string()))?;
        let store = Self { conn, cipher };
        store
            .create_schema_if_absent()
            .map_err(|e| unavailable(e.to_string()))?;
        Ok(store)
    }

    /// In-memory store, mostly for tests.
    pub fn open_in_memory(cipher: FieldCipher) -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, cipher };
        store.create_schema_if_absent()?;
        Ok(store)
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    /// Creates the entries table, and adds the seed column to older stores.
    pub fn create_schema_if_absent(&self) -> Result<(), VaultError> {
        self.conn.execute_batch(CREATE_ENTRIES)?;

        if !self.has_column("totp_seed")? {
            self.conn.execute(
                "ALTER TABLE entries ADD COLUMN totp_seed TEXT NOT NULL DEFAULT ''",
                [],
            )?;
            info!("added totp_seed column to existing vault");
        }
        Ok(())
    }

    fn has_column(&self, name: &str) -> Result<bool, VaultError> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(entries)")?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for column in columns {
            if column? == name {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn count(&self) -> Result<usize, VaultError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn insert(&self, fields: &EncryptedFields) -> Result<i64, VaultError> {
        self.conn.execute(
            "INSERT INTO entries (title, username, password, totp_seed) VALUES (?1, ?2, ?3, ?4)",
            params![
                fields.title,
                fields.username,
                fields.password,
                fields.totp_seed
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, "inserted record");
        Ok(id)
    }

    pub fn update(&self, id: i64, fields: &EncryptedFields) -> Result<(), VaultError> {
        let changed = self.conn.execute(
            "UPDATE entries SET title = ?1, username = ?2, password = ?3, totp_seed = ?4
             WHERE id = ?5",
            params![
                fields.title,
                fields.username,
                fields.password,
                fields.totp_seed,
                id
            ],
        )?;
        if changed == 0 {
            return Err(VaultError::RecordNotFound(id));
        }
        debug!(id, "updated record");
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<(), VaultError> {
        let changed = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(VaultError::RecordNotFound(id));
        }
        debug!(id, "deleted record");
        Ok(())
    }

    /// Raw blobs of one row.
    pub fn fetch(&self, id: i64) -> Result<Option<EncryptedFields>, VaultError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, username, password, totp_seed FROM entries WHERE id = ?1",
                params![id],
                read_row,
            )
            .optional()?;
        Ok(row.map(|(_, fields)| fields))
    }

    fn rows(&self) -> Result<Vec<(i64, EncryptedFields)>, VaultError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, username, password, totp_seed FROM entries ORDER BY id",
        )?;
        let rows = stmt.query_map([], read_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Decrypts every row with `passphrase`.
    ///
    /// The key is checked against the first row's title only; if that fails
    /// nothing else is decrypted. Later field failures mark the record
    /// corrupt instead of failing the whole load.
    pub fn load_all(&self, passphrase: &str) -> Result<Loaded, VaultError> {
        let rows = self.rows()?;
        let Some((first_id, first)) = rows.first() else {
            return Ok(Loaded::Empty);
        };

        let Ok(validated_title) = self.cipher.decrypt(passphrase, &first.title) else {
            warn!(id = first_id, "master key rejected");
            return Ok(Loaded::WrongKey);
        };

        let mut records = Vec::with_capacity(rows.len());
        for (index, (id, blobs)) in rows.iter().enumerate() {
            let mut plain = RecordFields::default();
            let mut corrupt = Vec::new();

            for field in Field::ALL {
                let value = if index == 0 && field == Field::Title {
                    Some(validated_title.clone())
                } else {
                    self.decrypt_field(passphrase, field, blobs.get(field))
                };
                match value {
                    Some(text) => set_field(&mut plain, field, &text),
                    None => {
                        warn!(id, %field, "field failed to decrypt");
                        corrupt.push(field);
                    }
                }
            }

            records.push(Record::new(*id, &plain, corrupt));
        }

        Ok(Loaded::Records(records))
    }

    fn decrypt_field(&self, passphrase: &str, field: Field, blob: &str) -> Option<Zeroizing<String>> {
        // rows written before 2FA support carry an empty seed column
        if field == Field::TotpSeed && blob.is_empty() {
            return Some(Zeroizing::new(String::new()));
        }
        self.cipher.decrypt(passphrase, blob).ok()
    }

    /// Re-encrypts fields still in the legacy SHA-256/IV format.
    ///
    /// The first row's title must decrypt in one of the two formats, otherwise
    /// nothing is written and [`VaultError::WrongMasterKey`] is returned.
    pub fn migrate_legacy(&mut self, passphrase: &str) -> Result<MigrationReport, VaultError> {
        let rows = self.rows()?;
        let mut report = MigrationReport::default();

        if let Some((first_id, first)) = rows.first() {
            let readable = self.cipher.decrypt(passphrase, &first.title).is_ok()
                || self.cipher.decrypt_legacy(passphrase, &first.title).is_ok();
            if !readable {
                warn!(id = first_id, "master key rejected for migration");
                return Err(VaultError::WrongMasterKey);
            }
        }

        let tx = self.conn.transaction()?;
        for (id, blobs) in &rows {
            for field in Field::ALL {
                let blob = blobs.get(field);
                if blob.is_empty() || self.cipher.decrypt(passphrase, blob).is_ok() {
                    report.current += 1;
                    continue;
                }

                let Ok(plain) = self.cipher.decrypt_legacy(passphrase, blob) else {
                    report.unreadable += 1;
                    continue;
                };

                let sealed = self.cipher.encrypt(passphrase, &plain)?;
                let sql = format!("UPDATE entries SET {} = ?1 WHERE id = ?2", field.column());
                tx.execute(&sql, params![sealed, id])?;
                report.migrated += 1;
            }
        }
        tx.commit()?;

        info!(
            migrated = report.migrated,
            unreadable = report.unreadable,
            "legacy migration finished"
        );
        Ok(report)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, EncryptedFields)> {
    Ok((
        row.get(0)?,
        EncryptedFields {
            title: row.get(1)?,
            username: row.get(2)?,
            password: row.get(3)?,
            totp_seed: row.get(4)?,
        },
    ))
}

fn set_field(fields: &mut RecordFields, field: Field, value: &str) {
    let slot = match field {
        Field::Title => &mut fields.title,
        Field::Username => &mut fields.username,
        Field::Password => &mut fields.password,
        Field::TotpSeed => &mut fields.totp_seed,
    };
    slot.clear();
    slot.push_str(value);
}
