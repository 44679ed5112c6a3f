use std::fmt;

use serde::Serialize;
use zeroize::Zeroize;

/// Id of the placeholder shown for an empty vault.
pub const WELCOME_ID: i64 = -1;

/// One encrypted column of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Username,
    Password,
    TotpSeed,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::Title,
        Field::Username,
        Field::Password,
        Field::TotpSeed,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Username => "username",
            Field::Password => "password",
            Field::TotpSeed => "totp_seed",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Plaintext input for creating or replacing a record.
#[derive(Clone, Default)]
pub struct RecordFields {
    pub title: String,
    pub username: String,
    pub password: String,
    /// Base32 seed; empty disables 2FA.
    pub totp_seed: String,
}

impl RecordFields {
    pub fn new(title: &str, username: &str, password: &str) -> Self {
        Self {
            title: title.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            totp_seed: String::new(),
        }
    }

    pub fn with_totp_seed(mut self, seed: &str) -> Self {
        self.totp_seed = seed.to_string();
        self
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Username => &self.username,
            Field::Password => &self.password,
            Field::TotpSeed => &self.totp_seed,
        }
    }
}

impl fmt::Debug for RecordFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordFields")
            .field("title", &self.title)
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("totp_seed", &"[REDACTED]")
            .finish()
    }
}

impl Drop for RecordFields {
    fn drop(&mut self) {
        self.title.zeroize();
        self.username.zeroize();
        self.password.zeroize();
        self.totp_seed.zeroize();
    }
}

/// A decrypted record.
///
/// Fields that failed to decrypt are left empty and listed in
/// [`Record::corrupt_fields`].
#[derive(Clone, Serialize)]
pub struct Record {
    id: i64,
    #[serde(flatten)]
    fields: FieldsView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    corrupt_fields: Vec<Field>,
}

#[derive(Clone, Serialize)]
struct FieldsView {
    title: String,
    username: String,
    password: String,
    totp_seed: String,
}

impl Drop for FieldsView {
    fn drop(&mut self) {
        self.title.zeroize();
        self.username.zeroize();
        self.password.zeroize();
        self.totp_seed.zeroize();
    }
}

impl Record {
    pub(crate) fn new(id: i64, fields: &RecordFields, corrupt_fields: Vec<Field>) -> Self {
        Self {
            id,
            fields: FieldsView {
                title: fields.title.clone(),
                username: fields.username.clone(),
                password: fields.password.clone(),
                totp_seed: fields.totp_seed.clone(),
            },
            corrupt_fields,
        }
    }

    /// Placeholder shown when the vault holds no records. Never persisted.
    pub fn welcome() -> Self {
        Self::new(
            WELCOME_ID,
            &RecordFields::new(
                "Welcome!",
                "Click the + to add your first entry...",
                "Enjoy :)",
            ),
            Vec::new(),
        )
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.fields.title
    }

    pub fn username(&self) -> &str {
        &self.fields.username
    }

    pub fn password(&self) -> &str {
        &self.fields.password
    }

    pub fn totp_seed(&self) -> &str {
        &self.fields.totp_seed
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Title => self.title(),
            Field::Username => self.username(),
            Field::Password => self.password(),
            Field::TotpSeed => self.totp_seed(),
        }
    }

    pub fn has_totp(&self) -> bool {
        !self.fields.totp_seed.is_empty()
    }

    pub fn is_welcome(&self) -> bool {
        self.id == WELCOME_ID
    }

    pub fn corrupt_fields(&self) -> &[Field] {
        &self.corrupt_fields
    }

    pub fn is_corrupt(&self) -> bool {
        !self.corrupt_fields.is_empty()
    }

    /// Plaintext copy of the fields, for editing.
    pub fn to_fields(&self) -> RecordFields {
        RecordFields {
            title: self.fields.title.clone(),
            username: self.fields.username.clone(),
            password: self.fields.password.clone(),
            totp_seed: self.fields.totp_seed.clone(),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("title", &self.fields.title)
            .field("password", &"[REDACTED]")
            .field("corrupt_fields", &self.corrupt_fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_placeholder() {
        let welcome = Record::welcome();
        assert!(welcome.is_welcome());
        assert_eq!(welcome.id(), -1);
        assert_eq!(welcome.title(), "Welcome!");
        assert!(!welcome.has_totp());
    }

    #[test]
    fn debug_redacts_secrets() {
        let fields = RecordFields::new("GitHub", "octo", "hunter2").with_totp_seed("JBSWY3DP");
        let out = format!("{fields:?}");
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("JBSWY3DP"));

        let record = Record::new(3, &fields, Vec::new());
        assert!(!format!("{record:?}").contains("hunter2"));
    }

    #[test]
    fn json_skips_empty_corrupt_list() {
        let record = Record::new(1, &RecordFields::new("a", "b", "c"), Vec::new());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "a");
        assert!(json.get("corrupt_fields").is_none());

        let broken = Record::new(2, &RecordFields::default(), vec![Field::Password]);
        let json = serde_json::to_value(&broken).unwrap();
        assert_eq!(json["corrupt_fields"][0], "password");
    }
}
