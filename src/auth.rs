use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "LOCKBOX_PASSWORD";

/// Master passphrase for this invocation.
///
/// An empty vault has no passphrase yet, so on first use the new one is
/// asked for twice.
pub fn read_master_password(first_use: bool) -> Result<Zeroizing<String>> {
    if let Some(pw) = password_from_env() {
        return Ok(pw);
    }
    if first_use {
        read_new_password_with_confirmation()
    } else {
        read_password()
    }
}

fn password_from_env() -> Option<Zeroizing<String>> {
    //  LOCKBOX_PASSWORD="supersecret" lockbox list
    let pw = Zeroizing::new(std::env::var(PASSWORD_ENV).ok()?);
    (!pw.is_empty()).then_some(pw)
}

pub fn read_password() -> Result<Zeroizing<String>> {
    //  stdin (pipeline)
    //  printf "%s" "$SECRET" | lockbox list
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
    }

    if io::stdin().is_terminal() {
        let pw = Zeroizing::new(rpassword::prompt_password("Master password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("No master password provided")
}

pub fn read_new_password_with_confirmation() -> Result<Zeroizing<String>> {
    if !io::stdin().is_terminal() {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut pw1 = Zeroizing::new(String::new());
        let mut pw2 = Zeroizing::new(String::new());

        handle.read_line(&mut pw1)?;
        handle.read_line(&mut pw2)?;

        trim_newline(&mut pw1);
        trim_newline(&mut pw2);

        return check_new_password(pw1, &pw2);
    }

    let pw1 = Zeroizing::new(rpassword::prompt_password("New master password: ")?);
    let pw2 = Zeroizing::new(rpassword::prompt_password("Confirm master password: ")?);

    check_new_password(pw1, &pw2)
}

fn check_new_password(pw1: Zeroizing<String>, pw2: &str) -> Result<Zeroizing<String>> {
    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1.as_str() != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
