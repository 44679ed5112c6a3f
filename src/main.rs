use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
mod auth;
use lockbox::{
    CharClasses, Field, KdfParams, Record, RecordFields, SessionConfig, Unlock, VaultSession,
    VaultError, default_store_path, generate_password, totp,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Args)]
struct SessionArgs {
    /// PBKDF2 iterations; must match the value the vault was written with (default: 100000)
    #[arg(long = "kdf-iterations", global = true, env = "LOCKBOX_KDF_ITERATIONS")]
    kdf_iterations: Option<u32>,

    /// Seconds without input before the session locks (default: 60)
    #[arg(long = "idle-timeout", global = true, env = "LOCKBOX_IDLE_TIMEOUT")]
    idle_timeout: Option<u32>,

    /// Seconds before a copied value is wiped from the clipboard (default: 10)
    #[arg(long = "clipboard-clear", global = true, env = "LOCKBOX_CLIPBOARD_CLEAR")]
    clipboard_clear: Option<u32>,
}

impl SessionArgs {
    fn to_config(&self) -> Result<SessionConfig> {
        let default = SessionConfig::default();

        Ok(SessionConfig {
            idle_timeout_secs: self.idle_timeout.unwrap_or(default.idle_timeout_secs),
            clipboard_clear_secs: self.clipboard_clear.unwrap_or(default.clipboard_clear_secs),
            wrong_key_notice_secs: default.wrong_key_notice_secs,
            kdf: KdfParams::new(self.kdf_iterations.unwrap_or(default.kdf.iterations()))?,
        })
    }
}

#[derive(Debug, clap::Args)]
struct CharClassArgs {
    /// Leave out uppercase letters
    #[arg(long)]
    no_upper: bool,

    /// Leave out lowercase letters
    #[arg(long)]
    no_lower: bool,

    /// Leave out digits
    #[arg(long)]
    no_digits: bool,

    /// Leave out punctuation
    #[arg(long)]
    no_symbols: bool,
}

impl CharClassArgs {
    fn to_classes(&self) -> CharClasses {
        CharClasses {
            upper: !self.no_upper,
            lower: !self.no_lower,
            digits: !self.no_digits,
            symbols: !self.no_symbols,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CopyField {
    Title,
    Username,
    Password,
    Totp,
}

impl From<CopyField> for Field {
    fn from(value: CopyField) -> Self {
        match value {
            CopyField::Title => Field::Title,
            CopyField::Username => Field::Username,
            CopyField::Password => Field::Password,
            CopyField::Totp => Field::TotpSeed,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "lockbox")]
#[command(
    version,
    about = "Local password vault with per-field encryption and TOTP codes."
)]
struct Cli {
    /// Path to the vault database
    #[arg(long, global = true, value_name = "PATH", env = "LOCKBOX_PATH")]
    store: Option<PathBuf>,

    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Lists all records, sorted by title
    List {
        /// Print records as JSON, including passwords
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Shows one record
    #[command(arg_required_else_help = true)]
    Show {
        id: i64,

        /// Print the password instead of a mask
        #[arg(short, long, default_value_t = false)]
        reveal: bool,
    },

    /// Adds a record
    #[command(arg_required_else_help = true)]
    Add {
        title: String,
        username: String,

        /// Password to store
        #[arg(long, required_unless_present = "generate", conflicts_with = "generate")]
        password: Option<String>,

        /// Generate a random password of this length instead
        #[arg(long, value_name = "LENGTH")]
        generate: Option<usize>,

        #[command(flatten)]
        classes: CharClassArgs,

        /// Base32 TOTP seed
        #[arg(long)]
        totp: Option<String>,
    },

    /// Changes fields of an existing record
    #[command(arg_required_else_help = true)]
    Update {
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long, conflicts_with = "generate")]
        password: Option<String>,

        /// Replace the password with a generated one of this length
        #[arg(long, value_name = "LENGTH")]
        generate: Option<usize>,

        #[command(flatten)]
        classes: CharClassArgs,

        /// Base32 TOTP seed; pass an empty value to disable 2FA
        #[arg(long)]
        totp: Option<String>,
    },

    /// Removes a record
    #[command(arg_required_else_help = true)]
    Remove { id: i64 },

    /// Prints the current TOTP code of a record
    #[command(arg_required_else_help = true)]
    Totp {
        id: i64,

        /// Keep printing codes every second until interrupted or idle
        #[arg(short, long, default_value_t = false)]
        follow: bool,
    },

    /// Copies a field to the clipboard and clears it after a delay
    #[command(arg_required_else_help = true)]
    Copy {
        id: i64,

        #[arg(long, value_enum, default_value_t = CopyField::Password)]
        field: CopyField,
    },

    /// Generates a random password without touching the vault
    Generate {
        #[arg(default_value_t = 20)]
        length: usize,

        #[command(flatten)]
        classes: CharClassArgs,
    },

    /// Rewrites fields still stored in the legacy SHA-256 format
    Migrate,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("LOCKBOX_LOG").unwrap_or_else(|_| EnvFilter::new("lockbox=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_store(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => default_store_path(),
    }
}

fn open_session(cli: &Cli) -> Result<VaultSession> {
    let path = resolve_store(cli.store.clone())?;
    let config = cli.session.to_config()?;
    debug!(path = %path.display(), "opening vault");
    Ok(VaultSession::open(&path, config)?)
}

fn unlock(session: &mut VaultSession) -> Result<()> {
    let password = auth::read_master_password(session.is_first_use()?)?;
    if let Unlock::FirstUse = session.unlock(password)? {
        debug!("vault is empty; passphrase becomes the master key");
    }
    Ok(())
}

fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;
    Ok(flag)
}

fn print_table(records: &[Record]) {
    let id_width = records
        .iter()
        .map(|r| r.id().to_string().len())
        .chain(std::iter::once("ID".len()))
        .max()
        .unwrap_or(2);

    let title_width = records
        .iter()
        .map(|r| r.title().chars().count())
        .chain(std::iter::once("Title".len()))
        .max()
        .unwrap_or(5);

    println!("{:<id_width$}  {:<title_width$}  Username", "ID", "Title");
    println!("{:-<id_width$}  {:-<title_width$}  --------", "", "");

    for r in records {
        let flag = if r.is_corrupt() { "  (corrupt)" } else { "" };
        println!(
            "{:<id_width$}  {:<title_width$}  {}{flag}",
            r.id(),
            r.title(),
            r.username()
        );
    }
}

fn print_record(session: &VaultSession, record: &Record, reveal: bool) -> Result<()> {
    println!("Title:    {}", record.title());
    println!("Username: {}", record.username());
    if reveal {
        println!("Password: {}", record.password());
    } else {
        println!("Password: {}", "*".repeat(record.password().chars().count()));
    }
    if record.has_totp() {
        println!("TOTP:     {}", totp_display(session, record.id())?);
    }
    if record.is_corrupt() {
        let fields: Vec<String> = record.corrupt_fields().iter().map(|f| f.to_string()).collect();
        println!("Unreadable fields: {}", fields.join(", "));
    }
    Ok(())
}

fn totp_display(session: &VaultSession, id: i64) -> Result<String> {
    match session.totp_for(id) {
        Ok(Some(code)) => Ok(code),
        Ok(None) => Ok("2FA disabled".to_string()),
        Err(VaultError::MalformedTotpSeed) => Ok(totp::MALFORMED_SEED.to_string()),
        Err(e) => Err(e.into()),
    }
}

fn copy_to_clipboard(session: &mut VaultSession, id: i64, field: Field) -> Result<()> {
    let value = session.copy_field(id, field)?;
    let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
    clipboard.set_text(value.as_str())?;
    drop(value);

    let interrupted = interrupt_flag()?;
    while let Some(remaining) = session.clipboard_countdown() {
        eprint!("\rClearing the clipboard in {remaining} seconds...");
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(Duration::from_secs(1));
        // waiting for the countdown counts as activity
        session.touch();
        if session.tick().clear_clipboard {
            break;
        }
    }

    clipboard.set_text("")?;
    eprintln!("\rClipboard cleared.{:30}", "");
    Ok(())
}

fn follow_totp(session: &mut VaultSession, id: i64) -> Result<()> {
    let interrupted = interrupt_flag()?;
    while !interrupted.load(Ordering::SeqCst) {
        let code = totp_display(session, id)?;
        let remaining = totp::seconds_remaining(chrono::Utc::now().timestamp().max(0) as u64);
        println!("{code}  ({remaining:>2}s)");

        thread::sleep(Duration::from_secs(1));
        if session.tick().locked {
            eprintln!("Session locked after inactivity.");
            break;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Generate { length, classes } = &cli.command {
        let password = generate_password(*length, classes.to_classes())?;
        println!("{}", password.as_str());
        return Ok(());
    }

    let mut session = open_session(&cli)?;

    if let Commands::Migrate = cli.command {
        let password = auth::read_master_password(false)?;
        let report = session.migrate_legacy(&password)?;
        println!(
            "migrated {} field(s), {} already current, {} unreadable",
            report.migrated, report.current, report.unreadable
        );
        return Ok(());
    }

    unlock(&mut session)?;

    match cli.command {
        Commands::List { json } => {
            let records = session.list_records()?;
            if json {
                println!("{}", serde_json::to_string_pretty(records)?);
            } else if records.is_empty() {
                print_table(&[Record::welcome()]);
            } else {
                print_table(records);
            }
        }
        Commands::Show { id, reveal } => {
            let record = session.record(id)?;
            print_record(&session, record, reveal)?;
        }
        Commands::Add {
            title,
            username,
            password,
            generate,
            classes,
            totp,
        } => {
            let password = match (password, generate) {
                (Some(p), _) => p,
                (None, Some(length)) => generate_password(length, classes.to_classes())?.to_string(),
                (None, None) => bail!("either --password or --generate is required"),
            };
            let mut fields = RecordFields::new(&title, &username, &password);
            if let Some(seed) = totp {
                fields = fields.with_totp_seed(&seed);
            }
            let id = session.create_record(&fields)?;
            println!("stored record {id} '{title}'");
        }
        Commands::Update {
            id,
            title,
            username,
            password,
            generate,
            classes,
            totp,
        } => {
            let mut fields = session.record(id)?.to_fields();
            if let Some(title) = title {
                fields.title = title;
            }
            if let Some(username) = username {
                fields.username = username;
            }
            if let Some(password) = password {
                fields.password = password;
            } else if let Some(length) = generate {
                fields.password = generate_password(length, classes.to_classes())?.to_string();
            }
            if let Some(seed) = totp {
                fields.totp_seed = seed;
            }
            session.update_record(id, &fields)?;
            println!("record {id} updated.");
        }
        Commands::Remove { id } => {
            session.delete_record(id)?;
            println!("record {id} removed.");
        }
        Commands::Totp { id, follow } => {
            if follow {
                follow_totp(&mut session, id)?;
            } else {
                println!("{}", totp_display(&session, id)?);
            }
        }
        Commands::Copy { id, field } => {
            copy_to_clipboard(&mut session, id, field.into())?;
        }
        Commands::Generate { .. } | Commands::Migrate => {}
    }

    session.lock();
    Ok(())
}
