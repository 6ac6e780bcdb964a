//! Reference codes customers write into their bank transfer memo.
//!
//! Shape: `PREFIX-YYYYMMDD-XXXXXX`, six base-36 characters drawn from the OS
//! random source. After `max_attempts` collisions the suffix becomes a
//! base-36 millisecond stamp that only ever increases within the process.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use tracing::warn;

use crate::store::ReferenceIndex;
use crate::utils::error::Result;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const SUFFIX_LEN: usize = 6;
/// Longest suffix: `u64::MAX` in base 36, the bound for timestamp fallbacks.
const MAX_SUFFIX_LEN: usize = 13;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

pub struct ReferenceCodeGenerator {
    prefix: String,
    max_attempts: u32,
    last_fallback_millis: AtomicU64,
}

impl ReferenceCodeGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_attempts(prefix, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_attempts(prefix: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts,
            last_fallback_millis: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns a code not present in `index` at the time of the check.
    ///
    /// Nothing is reserved: the caller must still treat a uniqueness failure
    /// on insert as retryable.
    pub async fn generate<I>(&self, index: &I) -> Result<String>
    where
        I: ReferenceIndex + ?Sized,
    {
        let now = Utc::now();
        for _ in 0..self.max_attempts {
            let candidate = self.random_code(now);
            if !index.reference_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        let fallback = self.fallback_code(now);
        warn!(
            attempts = self.max_attempts,
            reference_code = %fallback,
            "Random reference codes exhausted, using timestamp suffix"
        );
        Ok(fallback)
    }

    fn date_part(now: DateTime<Utc>) -> String {
        now.format("%Y%m%d").to_string()
    }

    fn random_code(&self, now: DateTime<Utc>) -> String {
        let mut rng = OsRng;
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}-{}-{}", self.prefix, Self::date_part(now), suffix)
    }

    fn fallback_code(&self, now: DateTime<Utc>) -> String {
        let wall = now.timestamp_millis().max(0) as u64;
        let previous = self
            .last_fallback_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or(wall);
        let stamp = wall.max(previous + 1);
        format!("{}-{}-{}", self.prefix, Self::date_part(now), to_base36(stamp))
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

/// True when `code` has the `PREFIX-YYYYMMDD-XXXXXX` shape, random or
/// timestamp suffix.
pub fn is_well_formed(code: &str, prefix: &str) -> bool {
    let Some(rest) = code
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    let Some((date, suffix)) = rest.split_once('-') else {
        return false;
    };
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && (SUFFIX_LEN..=MAX_SUFFIX_LEN).contains(&suffix.len())
        && suffix.bytes().all(|b| ALPHABET.contains(&b))
}
