//! Cache store trait for holding serialized business data.
//!
//! This module defines the [`CacheStore`] trait, a string key/value store with optional
//! per-key expiration, and [`pattern_matches`], the glob matcher used for key-pattern
//! lookups by stores that cannot evaluate patterns natively.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::{DataError, Result};

/// Key/value store with per-key expiration.
///
/// Values are strings (JSON-serialized payloads). Operations are atomic per key; the
/// last write to a key wins. Expired keys are unreadable and are not listed by
/// [`CacheStore::keys`].
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "redis").
    fn name(&self) -> &str;

    /// Reads a key. Returns `Ok(None)` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a key, replacing any previous value and expiration.
    ///
    /// `None` means the key never expires. A zero TTL is rejected.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Writes a key that expires after `ttl` (SETEX).
    async fn set_ex(&self, key: &str, ttl: Duration, value: &str) -> Result<()> {
        self.set(key, value, Some(ttl)).await
    }

    /// Deletes the given keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// Lists the live keys matching a glob pattern (`*`, `?`, `[...]`, `\` escapes).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Deletes every live key matching a glob pattern. Returns how many were removed.
    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let keys = self.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete(&keys).await
    }
}

/// Rejects `Some(Duration::ZERO)`; use `None` for entries that never expire.
pub fn validate_ttl(ttl: Option<Duration>) -> Result<()> {
    match ttl {
        Some(ttl) if ttl.is_zero() => Err(DataError::InvalidParameter(
            "cache TTL cannot be zero - use None for no expiration".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Matches a key against a Redis-style glob pattern.
///
/// Supports `*` (any run of characters), `?` (exactly one character), `[abc]`,
/// `[^abc]` and `[a-z]` classes, and `\` to escape the next character.
#[must_use]
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    glob(&pattern, &key)
}

fn glob(pattern: &[char], key: &[char]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some('*') => {
            let mut rest = &pattern[1..];
            while rest.first() == Some(&'*') {
                rest = &rest[1..];
            }
            if rest.is_empty() {
                return true;
            }
            (0..=key.len()).any(|i| glob(rest, &key[i..]))
        }
        Some('?') => !key.is_empty() && glob(&pattern[1..], &key[1..]),
        Some('[') => {
            let Some(&c) = key.first() else {
                return false;
            };
            match char_class(&pattern[1..], c) {
                Some((matched, consumed)) => matched && glob(&pattern[1 + consumed..], &key[1..]),
                // Unterminated class: the bracket is a literal.
                None => c == '[' && glob(&pattern[1..], &key[1..]),
            }
        }
        Some('\\') if pattern.len() > 1 => {
            key.first() == Some(&pattern[1]) && glob(&pattern[2..], &key[1..])
        }
        Some(&literal) => key.first() == Some(&literal) && glob(&pattern[1..], &key[1..]),
    }
}

/// Evaluates a `[...]` class (pattern starts after the `[`).
///
/// Returns whether `c` matched and how many pattern chars were consumed, including
/// the closing `]`, or `None` if the class is unterminated.
fn char_class(pattern: &[char], c: char) -> Option<(bool, usize)> {
    let mut i = 0;
    let negate = pattern.first() == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() {
        match pattern[i] {
            ']' => return Some((matched != negate, i + 1)),
            '\\' if i + 1 < pattern.len() => {
                matched |= pattern[i + 1] == c;
                i += 2;
            }
            lo if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' => {
                let hi = pattern[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&c);
                i += 3;
            }
            other => {
                matched |= other == c;
                i += 1;
            }
        }
    }
    None
}
