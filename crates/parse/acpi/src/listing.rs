//! Normalizing disassembler output into listing lines.
//!
//! The disassembler wraps a mixed listing in a compiler banner and a
//! trailing table dump, and it stops printing hex rows before the final
//! bytes of the table. [`split_listing`] removes the wrapping and
//! [`restore_trailing_rows`] rebuilds the missing rows from the raw image
//! so that offset arithmetic stays consistent to the end of the table.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::hex::{format_row, parse_hex_row};

/// Trailers after which the disassembler dumps the table header and raw
/// data again. Only the first one found is cut, at its last occurrence.
const TRAILERS: &[&str] = &["\nTable Header:", "\nRaw Table Data: Length"];

/// Bytes per synthesized hex row, matching the disassembler's own rows.
pub const ROW_WIDTH: usize = 16;

/// Strip the leading `/* ... */` banner and any trailing header dump.
#[must_use]
pub fn clean_listing(text: &str) -> String {
    let mut body = text;
    if body.starts_with("/*") {
        body = match body.find("*/") {
            Some(pos) => body[pos + 2..].trim(),
            None => "",
        };
    }
    for trailer in TRAILERS {
        if let Some(pos) = body.rfind(trailer) {
            body = body[..pos].trim_end();
            break;
        }
    }
    body.to_string()
}

/// Clean disassembler output and split it into lines.
#[must_use]
pub fn split_listing(text: &str) -> Vec<String> {
    clean_listing(text).split('\n').map(ToString::to_string).collect()
}

/// Rebuild the hex rows the disassembler left off the end of a listing.
///
/// Takes the last printed row, continues from its address + length, and
/// emits 16-byte rows covering the rest of `raw`. If the last row's bytes
/// do not sit at its labelled address, falls back to the bytes after the
/// last occurrence of that row in `raw`.
///
/// Returns an empty vector when the listing has no hex rows or already
/// reaches the end of the table.
#[must_use]
pub fn restore_trailing_rows<L: AsRef<str>>(lines: &[L], raw: &[u8]) -> Vec<String> {
    let Some(last) = lines.iter().rev().find_map(|l| parse_hex_row(l.as_ref())) else {
        return Vec::new();
    };
    let next_addr = last.address + last.bytes.len();

    let remaining = if raw.get(last.address..next_addr) == Some(last.bytes.as_slice()) {
        &raw[next_addr..]
    } else {
        match rfind(raw, &last.bytes) {
            Some(pos) => &raw[pos + last.bytes.len()..],
            None => &[],
        }
    };

    remaining
        .chunks(ROW_WIDTH)
        .enumerate()
        .map(|(i, chunk)| format_row(next_addr + i * ROW_WIDTH, chunk))
        .collect()
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
