//! Percent codec for records transported as a single byte stream.
//!
//! Two layers: `escape`/`unescape` operate on raw bytes and are what the
//! typed flavor applies to textual field files; `encode`/`decode` frame a
//! whole table (string keys to string values) as sorted `key=value` lines.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A textual table, the record form understood by `encode`/`decode`.
pub type Table = BTreeMap<String, String>;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn must_escape(byte: u8) -> bool {
    byte == b'%' || byte == b'=' || byte < 0x20 || byte == 0x7f
}

/// Percent-escapes `bytes`: `%`, `=`, and every non-printable byte become
/// `%HH`; everything else passes through unchanged, byte for byte, so
/// multi-byte UTF-8 sequences and arbitrary binary survive intact.
pub fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        if must_escape(byte) {
            out.push(b'%');
            out.push(HEX_DIGITS[(byte >> 4) as usize]);
            out.push(HEX_DIGITS[(byte & 0x0f) as usize]);
        } else {
            out.push(byte);
        }
    }
    out
}

/// Reverses `escape`. Fails when a `%` is not followed by two hex digits.
pub fn unescape(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&byte) = iter.next() {
        if byte != b'%' {
            out.push(byte);
            continue;
        }
        let hi = iter.next().ok_or(Error::Malformed("truncated escape"))?;
        let lo = iter.next().ok_or(Error::Malformed("truncated escape"))?;
        let hi = (*hi as char)
            .to_digit(16)
            .ok_or(Error::Malformed("invalid escape digit"))?;
        let lo = (*lo as char)
            .to_digit(16)
            .ok_or(Error::Malformed("invalid escape digit"))?;
        out.push(((hi << 4) | lo) as u8);
    }
    Ok(out)
}

/// Encodes a table as newline-terminated `key=value` lines, keys sorted
/// lexicographically, both sides percent-escaped.
pub fn encode(table: &Table) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in table {
        out.extend_from_slice(&escape(key.as_bytes()));
        out.push(b'=');
        out.extend_from_slice(&escape(value.as_bytes()));
        out.push(b'\n');
    }
    out
}

/// Decodes the output of [`encode`].
///
/// Fails when a line lacks `=`, an escape sequence is invalid, the input
/// does not end with a newline, or an unescaped side is not valid UTF-8.
pub fn decode(bytes: &[u8]) -> Result<Table> {
    let mut table = Table::new();
    if bytes.is_empty() {
        return Ok(table);
    }
    if !bytes.ends_with(b"\n") {
        return Err(Error::Malformed("missing final line terminator"));
    }
    for line in bytes[..bytes.len() - 1].split(|&b| b == b'\n') {
        let sep = line
            .iter()
            .position(|&b| b == b'=')
            .ok_or(Error::Malformed("line without separator"))?;
        let key = String::from_utf8(unescape(&line[..sep])?)
            .map_err(|_| Error::Malformed("key is not valid UTF-8"))?;
        let value = String::from_utf8(unescape(&line[sep + 1..])?)
            .map_err(|_| Error::Malformed("value is not valid UTF-8"))?;
        table.insert(key, value);
    }
    Ok(table)
}
