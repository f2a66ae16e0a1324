//! Java-properties codec for PID configurations.
//!
//! PID configurations live on disk as `<pid>.properties` files. The codec is
//! line-based: one `key = value` pair per line, `#`/`!` comment lines, and
//! backslash escapes for separators and control characters. Maps round-trip
//! key-wise; key order on disk is sorted so repeated stores of the same map
//! produce identical bytes.

use std::collections::BTreeMap;

use crate::error::StoreError;

/// Parse a properties file into a key/value map.
///
/// Blank lines and comment lines (`#` or `!`) are skipped. Keys are separated
/// from values by the first unescaped `=` or `:`; a line without a separator
/// yields the whole line as a key with an empty value.
pub fn parse(bytes: &[u8]) -> Result<BTreeMap<String, String>, StoreError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::Properties(format!("not valid UTF-8: {e}")))?;
    let mut map = BTreeMap::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let (raw_key, raw_value) = split_pair(trimmed);
        let key = unescape(raw_key.trim_end())?;
        let value = unescape(raw_value.trim())?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Render a key/value map as properties-file bytes, keys sorted.
pub fn render(map: &BTreeMap<String, String>) -> Vec<u8> {
    let mut out = String::new();
    for (key, value) in map {
        out.push_str(&escape(key, true));
        out.push_str(" = ");
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out.into_bytes()
}

/// Split a line at the first unescaped `=` or `:`.
fn split_pair(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..idx], &line[idx + ch.len_utf8()..]),
            _ => {}
        }
    }
    (line, "")
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(ch);
            }
            ' ' if is_key => out.push_str("\\ "),
            '#' | '!' if is_key && out.is_empty() => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String, StoreError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => return Err(StoreError::Properties("dangling escape".into())),
        }
    }
    Ok(out)
}
