//! Key normalization for Sentry tag and extra keys.

/// Longest key the SDK accepts for tags.
pub const MAX_KEY_LEN: usize = 32;

/// Normalize a free-form key into the SDK's accepted key grammar.
///
/// ASCII-lowercases the key, replaces every character outside `a-z0-9_.:-`
/// with `_`, and truncates to [`MAX_KEY_LEN`]. Idempotent: normalizing an
/// already-normalized key returns it unchanged.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            'a'..='z' | '0'..='9' | '_' | '.' | ':' | '-' => c,
            _ => '_',
        })
        .take(MAX_KEY_LEN)
        .collect()
}
