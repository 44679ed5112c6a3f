//! Random password generation.

use anyhow::{Result, anyhow};
use getrandom::fill;
use zeroize::Zeroizing;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Character classes a generated password may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharClasses {
    pub upper: bool,
    pub lower: bool,
    pub digits: bool,
    pub symbols: bool,
}

impl Default for CharClasses {
    fn default() -> Self {
        Self {
            upper: true,
            lower: true,
            digits: true,
            symbols: true,
        }
    }
}

impl CharClasses {
    fn alphabet(&self) -> Vec<u8> {
        let mut alphabet = Vec::new();
        for (enabled, set) in [
            (self.upper, UPPER),
            (self.lower, LOWER),
            (self.digits, DIGITS),
            (self.symbols, SYMBOLS),
        ] {
            if enabled {
                alphabet.extend_from_slice(set.as_bytes());
            }
        }
        alphabet
    }
}

/// Generate `length` characters drawn uniformly from the enabled classes.
///
/// Returns an empty string when no class is enabled.
pub fn generate_password(length: usize, classes: CharClasses) -> Result<Zeroizing<String>> {
    let alphabet = classes.alphabet();
    let mut password = Zeroizing::new(String::with_capacity(length));
    if alphabet.is_empty() {
        return Ok(password);
    }

    for _ in 0..length {
        let index = uniform_index(alphabet.len())?;
        password.push(char::from(alphabet[index]));
    }
    Ok(password)
}

/// Unbiased index in `0..bound` by rejection sampling.
fn uniform_index(bound: usize) -> Result<usize> {
    let bound = u32::try_from(bound).map_err(|_| anyhow!("alphabet too large"))?;
    let zone = u32::MAX - (u32::MAX % bound);
    loop {
        let mut buf = [0u8; 4];
        fill(&mut buf).map_err(|_| anyhow!("OS random generator unavailable"))?;
        let value = u32::from_le_bytes(buf);
        if value < zone {
            return Ok((value % bound) as usize);
        }
    }
}
