//! RFC 6238 time-based one-time codes (HMAC-SHA1, 30 second step, 6 digits).

use chrono::Utc;
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

/// Seconds covered by one code.
pub const PERIOD_SECS: u64 = 30;
/// Number of digits in a code.
pub const DIGITS: u32 = 6;
/// Shown instead of a code when the seed cannot be decoded.
pub const MALFORMED_SEED: &str = "Unrecognizable seed format";

type HmacSha1 = Hmac<Sha1>;

/// Errors returned while generating a TOTP value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TotpError {
    #[error("seed is not valid base32")]
    InvalidSeed,
}

/// Code for the current wall-clock time, or [`MALFORMED_SEED`].
pub fn generate(seed: &str) -> String {
    generate_at(seed, now_unix()).unwrap_or_else(|_| MALFORMED_SEED.to_string())
}

/// Code for the 30 second window containing `unix_secs`.
pub fn generate_at(seed: &str, unix_secs: u64) -> Result<String, TotpError> {
    let key = decode_seed(seed)?;
    let counter = unix_secs / PERIOD_SECS;

    let mut mac = HmacSha1::new_from_slice(&key).map_err(|_| TotpError::InvalidSeed)?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let value = u32::from_be_bytes([
        hash[offset],
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]) & 0x7fff_ffff;

    Ok(format!(
        "{:0width$}",
        value % 10u32.pow(DIGITS),
        width = DIGITS as usize
    ))
}

/// Seconds until the code for `unix_secs` rolls over.
pub fn seconds_remaining(unix_secs: u64) -> u64 {
    PERIOD_SECS - unix_secs % PERIOD_SECS
}

pub(crate) fn now_unix() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

fn decode_seed(seed: &str) -> Result<Zeroizing<Vec<u8>>, TotpError> {
    let normalized: Zeroizing<String> = Zeroizing::new(
        seed.chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_uppercase())
            .collect(),
    );
    let unpadded = normalized.trim_end_matches('=');
    if unpadded.is_empty() {
        return Err(TotpError::InvalidSeed);
    }

    BASE32_NOPAD
        .decode(unpadded.as_bytes())
        .map(Zeroizing::new)
        .map_err(|_| TotpError::InvalidSeed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // "12345678901234567890" from RFC 6238 appendix B
    const RFC_SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn rfc_vectors_sha1() {
        // last six digits of the 8 digit reference values
        let cases = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
        ];
        for (time, expected) in cases {
            assert_eq!(generate_at(RFC_SEED, time).unwrap(), expected, "t={time}");
        }
    }

    #[test]
    fn seed_is_normalized() {
        let messy = "gezd gnbv gy3t qojq gezd gnbv gy3t qojq";
        assert_eq!(generate_at(messy, 59).unwrap(), "287082");
    }

    #[test]
    fn padded_seed_is_accepted() {
        // "12345" encodes to 8 symbols without padding, "1234" needs one pad char
        assert!(generate_at("GEZDGNA=", 59).is_ok());
    }

    #[test]
    fn same_window_same_code() {
        assert_eq!(
            generate_at(RFC_SEED, 1_111_111_080).unwrap(),
            generate_at(RFC_SEED, 1_111_111_109).unwrap()
        );
    }

    #[test]
    fn different_windows_differ() {
        assert_ne!(
            generate_at(RFC_SEED, 59).unwrap(),
            generate_at(RFC_SEED, 1_111_111_109).unwrap()
        );
    }

    #[test]
    fn rejects_invalid_seed() {
        assert_eq!(generate_at("not-base32!!", 0), Err(TotpError::InvalidSeed));
        assert_eq!(generate_at("", 0), Err(TotpError::InvalidSeed));
    }

    #[test]
    fn generate_reports_malformed_seed() {
        assert_eq!(generate("not-base32!!"), MALFORMED_SEED);
    }

    #[test]
    fn generate_produces_six_digits() {
        let code = generate(RFC_SEED);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn remaining_counts_down() {
        assert_eq!(seconds_remaining(0), 30);
        assert_eq!(seconds_remaining(29), 1);
        assert_eq!(seconds_remaining(30), 30);
    }
}
