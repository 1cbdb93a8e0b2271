//! Worktree name generation.
//!
//! Names are `<prefix><base36-timestamp>-<4-char-random>`, matching the
//! shape spec.md §4.3 requires for worktrees created by `Coordinator::register`.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const RANDOM_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Default prefix used for generated worktree names.
pub const DEFAULT_PREFIX: &str = "parallel-";

/// Generate a unique worktree name: `<prefix><base36 unix-seconds>-<4 random chars>`.
#[must_use]
pub fn generate_worktree_name(prefix: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let ts = to_base36(secs);
    let suffix = random_suffix(4);
    format!("{prefix}{ts}-{suffix}")
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..RANDOM_ALPHABET.len());
            RANDOM_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_name_has_prefix_and_shape() {
        let name = generate_worktree_name(DEFAULT_PREFIX);
        assert!(name.starts_with(DEFAULT_PREFIX));
        let rest = &name[DEFAULT_PREFIX.len()..];
        let (ts, suffix) = rest.split_once('-').expect("dash separator");
        assert!(!ts.is_empty());
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn names_are_very_likely_unique() {
        let a = generate_worktree_name(DEFAULT_PREFIX);
        let b = generate_worktree_name(DEFAULT_PREFIX);
        assert_ne!(a, b);
    }

    #[test]
    fn base36_zero_is_zero() {
        assert_eq!(to_base36(0), "0");
    }

    #[test]
    fn base36_roundtrip_sanity() {
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(35), "z");
    }
}
