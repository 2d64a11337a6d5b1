//! Sentinel encoding.
//!
//! A sentinel is `U+E000`, eight lowercase hex digits of the action id, then
//! `U+E001`. Private-use code points are not tag delimiters, whitespace,
//! attribute separators or `&`, so sentinels pass through HTML tokenization as
//! ordinary content and can be spotted in any tokenizer state.

use super::ActionId;

pub const OPEN: char = '\u{E000}';
pub const CLOSE: char = '\u{E001}';

const DIGITS: usize = 8;

/// Encoded sentinel length in bytes.
pub const LEN: usize = OPEN.len_utf8() + DIGITS + CLOSE.len_utf8();

/// First UTF-8 byte of `OPEN`, for byte scans.
pub const LEAD_BYTE: u8 = 0xEE;

pub fn is_reserved(ch: char) -> bool {
    ch == OPEN || ch == CLOSE
}

pub fn push(out: &mut String, id: ActionId) {
    use std::fmt::Write;
    out.push(OPEN);
    let _ = write!(out, "{:08x}", id.0);
    out.push(CLOSE);
}

/// Decode the sentinel starting at byte offset `at`, if there is one.
pub fn decode_at(text: &str, at: usize) -> Option<ActionId> {
    let rest = text.get(at..)?;
    let body = rest.strip_prefix(OPEN)?;
    let digits = body.get(..DIGITS)?;
    if !body[DIGITS..].starts_with(CLOSE) {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok().map(ActionId)
}
