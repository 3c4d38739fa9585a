//! Compact `key:value, ...` notation shared by all descriptor types.
//!
//! Separators nested inside `[...]` do not split: `resources:[cpus:1;ports:0..5,9..9]`
//! is a single entry whose value is `cpus:1;ports:0..5,9..9`.

use crate::ApiError;

/// Split `s` on `sep`, ignoring separators nested in brackets.
///
/// Parts are trimmed and empty parts dropped.
pub(crate) fn split_top(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parse `key:value` entries separated by `sep`.
///
/// Values wrapped in brackets are returned without them.
pub(crate) fn entries(s: &str, sep: char) -> Result<Vec<(&str, &str)>, ApiError> {
    split_top(s, sep)
        .into_iter()
        .map(|part| {
            let (key, value) = part
                .split_once(':')
                .ok_or_else(|| ApiError::InvalidEntry(part.to_string()))?;
            Ok((key.trim(), unbracket(value.trim())))
        })
        .collect()
}

fn unbracket(value: &str) -> &str {
    value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value)
}
