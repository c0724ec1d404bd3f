use crate::error::{Error, Result};

/// Normalize a BSSID to the canonical form `xx:xx:xx:xx:xx:xx` (lowercase).
///
/// Accepts colon-separated hex, hyphen-separated hex, 12 contiguous hex
/// digits, or any 17-character form with single-character separators at the
/// colon positions. Anything else is rejected.
pub fn normalize_bssid(raw: &str) -> Result<String> {
    let bytes = parse_bytes(raw).ok_or_else(|| Error::InvalidAddress(raw.to_string()))?;
    Ok(bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(":"))
}

fn parse_bytes(raw: &str) -> Option<[u8; 6]> {
    if let Some(bytes) = parse_separated(raw, ':') {
        return Some(bytes);
    }
    if let Some(bytes) = parse_separated(raw, '-') {
        return Some(bytes);
    }
    match raw.len() {
        12 => parse_at_stride(raw, 2),
        17 => parse_at_stride(raw, 3),
        _ => None,
    }
}

fn parse_separated(raw: &str, separator: char) -> Option<[u8; 6]> {
    let parts: Vec<&str> = raw.split(separator).collect();
    if parts.len() != 6 {
        return None;
    }
    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(bytes)
}

/// Parses six hex pairs spaced `stride` characters apart. The characters
/// between pairs (if any) are not inspected.
fn parse_at_stride(raw: &str, stride: usize) -> Option<[u8; 6]> {
    let mut bytes = [0u8; 6];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let pair = raw.get(i * stride..i * stride + 2)?;
        *byte = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(bytes)
}
