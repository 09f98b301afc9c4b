//! Hex rows of a mixed AML listing and the runs they form.
//!
//! A mixed listing interleaves ASL source lines with the AML bytes they
//! compiled to, printed as address-labelled rows:
//!
//! ```text
//!     Device (EC0)
//!     0000A3F1: 5B 82 4E 0A 45 43 30 5F  // [.N.EC0_
//! ```
//!
//! A *run* is a maximal block of consecutive hex rows. The functions here
//! walk runs forward and backward from a line index and map lines back to
//! byte offsets in the raw table.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write};

/// Errors from decoding a hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    /// The string has an odd number of hex digits.
    OddLength,
    /// A character that is not a hex digit was found at this position.
    InvalidDigit(usize),
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OddLength => write!(f, "hex string has an odd number of digits"),
            Self::InvalidDigit(pos) => write!(f, "invalid hex digit at position {pos}"),
        }
    }
}

impl core::error::Error for HexError {}

/// One parsed hex row: its address label and the bytes it lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRow {
    /// Offset of the first byte of the row within the table.
    pub address: usize,
    /// Bytes listed on the row.
    pub bytes: Vec<u8>,
}

/// A contiguous block of hex rows, decoded to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRun {
    /// Concatenated bytes of every row in the run.
    pub bytes: Vec<u8>,
    /// Index of the first row of the run.
    pub start: usize,
    /// Index of the last row of the run (inclusive).
    pub end: usize,
}

fn is_upper_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'A'..=b'F').contains(&b)
}

fn nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Parse a line as a hex row.
///
/// Accepts exactly the shape `^\s*[0-9A-F]{4,}:(\s[0-9A-F]{2})+(\s+//.*)?$`.
/// Anything else (source lines, comments, lowercase digits) is `None`.
#[must_use]
pub fn parse_hex_row(line: &str) -> Option<HexRow> {
    let s = line.trim_start();
    let colon = s.find(':')?;
    let label = &s.as_bytes()[..colon];
    if label.len() < 4 || !label.iter().copied().all(is_upper_hex) {
        return None;
    }
    let address = usize::from_str_radix(&s[..colon], 16).ok()?;

    let rest = &s[colon + 1..];
    let (body, has_comment) = match rest.find("//") {
        Some(pos) => (&rest[..pos], true),
        None => (rest, false),
    };

    let body = body.as_bytes();
    let mut bytes = Vec::new();
    let mut pos = 0;
    while pos + 3 <= body.len()
        && body[pos].is_ascii_whitespace()
        && is_upper_hex(body[pos + 1])
        && is_upper_hex(body[pos + 2])
    {
        bytes.push((nibble(body[pos + 1])? << 4) | nibble(body[pos + 2])?);
        pos += 3;
    }
    if bytes.is_empty() {
        return None;
    }

    let tail = &body[pos..];
    let tail_ok = if has_comment {
        !tail.is_empty() && tail.iter().all(u8::is_ascii_whitespace)
    } else {
        tail.is_empty()
    };
    tail_ok.then_some(HexRow { address, bytes })
}

/// Returns `true` if `line` is a hex row.
#[must_use]
pub fn is_hex_row(line: &str) -> bool {
    parse_hex_row(line).is_some()
}

fn row_at<L: AsRef<str>>(lines: &[L], index: usize) -> Option<HexRow> {
    lines.get(index).and_then(|l| parse_hex_row(l.as_ref()))
}

/// Collect the run that begins at `start` and continues forward.
///
/// Returns `None` when `start` is out of range or not a hex row.
#[must_use]
pub fn hex_after<L: AsRef<str>>(lines: &[L], start: usize) -> Option<HexRun> {
    let mut bytes = Vec::new();
    let mut end = None;
    let mut index = start;
    while let Some(row) = row_at(lines, index) {
        bytes.extend_from_slice(&row.bytes);
        end = Some(index);
        index += 1;
    }
    end.map(|end| HexRun { bytes, start, end })
}

/// Collect the run that ends at `end` and continues backward.
///
/// Returns `None` when `end` is out of range or not a hex row.
#[must_use]
pub fn hex_before<L: AsRef<str>>(lines: &[L], end: usize) -> Option<HexRun> {
    let mut rows = Vec::new();
    let mut index = end;
    while let Some(row) = row_at(lines, index) {
        rows.push(row);
        if index == 0 {
            break;
        }
        index -= 1;
    }
    if rows.is_empty() {
        return None;
    }
    let start = end + 1 - rows.len();
    let bytes = rows.into_iter().rev().flat_map(|r| r.bytes).collect();
    Some(HexRun { bytes, start, end })
}

/// Find the first run strictly after the block containing `from`.
///
/// If `from` sits inside a run, that run is skipped first; a non-hex line
/// at `from` is skipped as well. This is how callers step from a
/// declaration line to the bytes it compiled to, and from one run to the
/// next.
#[must_use]
pub fn next_hex_run<L: AsRef<str>>(lines: &[L], from: usize) -> Option<HexRun> {
    let mut in_old = true;
    for index in from..lines.len() {
        let hex = is_hex_row(lines[index].as_ref());
        if in_old {
            if !hex {
                in_old = false;
            }
            continue;
        }
        if hex {
            return hex_after(lines, index);
        }
    }
    None
}

/// Find the closest run strictly before the block containing `from`.
///
/// Mirror of [`next_hex_run`].
#[must_use]
pub fn previous_hex_run<L: AsRef<str>>(lines: &[L], from: usize) -> Option<HexRun> {
    if lines.is_empty() {
        return None;
    }
    let mut in_old = true;
    for index in (0..=from.min(lines.len() - 1)).rev() {
        let hex = is_hex_row(lines[index].as_ref());
        if in_old {
            if !hex {
                in_old = false;
            }
            continue;
        }
        if hex {
            return hex_before(lines, index);
        }
    }
    None
}

/// Byte offset within the table that corresponds to line `index`.
///
/// A hex row answers with its own address label. Any other line answers
/// with the offset just past the closest hex row above it, i.e. where the
/// bytes for that source line begin. Lines above the first hex row have no
/// offset.
#[must_use]
pub fn locate<L: AsRef<str>>(lines: &[L], index: usize) -> Option<usize> {
    if let Some(row) = row_at(lines, index) {
        return Some(row.address);
    }
    let upto = index.min(lines.len());
    lines[..upto]
        .iter()
        .rev()
        .find_map(|l| parse_hex_row(l.as_ref()))
        .map(|row| row.address + row.bytes.len())
}

/// Format a hex row the way the disassembler prints one.
#[must_use]
pub fn format_row(address: usize, bytes: &[u8]) -> String {
    let mut line = String::new();
    let _ = write!(line, "   {address:04X}:");
    for b in bytes {
        let _ = write!(line, " {b:02X}");
    }
    line
}

/// Encode bytes as an uppercase hex string with no separators.
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out
}

/// Decode a hex string. Whitespace between digits is ignored.
///
/// # Errors
///
/// Returns [`HexError`] for odd-length input or non-hex characters.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, HexError> {
    let mut out = Vec::with_capacity(text.len() / 2);
    let mut high: Option<u8> = None;
    for (pos, c) in text.bytes().enumerate() {
        if c.is_ascii_whitespace() {
            continue;
        }
        let n = nibble(c).ok_or(HexError::InvalidDigit(pos))?;
        match high.take() {
            Some(h) => out.push((h << 4) | n),
            None => high = Some(n),
        }
    }
    if high.is_some() {
        return Err(HexError::OddLength);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &[&str] = &[
        "    Scope (_SB)",
        "    {",
        "        Device (EC0)",
        "    0024: 10 47 05 5F 53 42 5F  // .G._SB_",
        "    002B: 5B 82 45 04 45 43 30 5F  // [.E.EC0_",
        "        {",
        "            Method (_STA, 0, NotSerialized)",
        "    0033: 14 09 5F 53 54 41 00",
        "            {",
        "    003A: A4 0A 0F",
        "            }",
    ];

    #[test]
    fn recognizes_hex_rows() {
        assert!(is_hex_row("    0024: 10 47 05 5F  // .G._"));
        assert!(is_hex_row("0000A3F1: 5B 82"));
        assert!(!is_hex_row("        Device (EC0)"));
        assert!(!is_hex_row("    024: 10 47"));
        assert!(!is_hex_row("    0024: 1a 47"));
        assert!(!is_hex_row("    0024:"));
        assert!(!is_hex_row("    0024: 10 47// no space before comment"));
        assert!(!is_hex_row("    0024: 10 47 trailing"));
    }

    #[test]
    fn parses_address_and_bytes() {
        let row = parse_hex_row("    002B: 5B 82 45  // [.E").unwrap();
        assert_eq!(row.address, 0x2B);
        assert_eq!(row.bytes, vec![0x5B, 0x82, 0x45]);
    }

    #[test]
    fn hex_after_collects_contiguous_rows() {
        let run = hex_after(LISTING, 3).unwrap();
        assert_eq!((run.start, run.end), (3, 4));
        assert_eq!(run.bytes.len(), 15);
        assert_eq!(&run.bytes[..3], &[0x10, 0x47, 0x05]);
        assert!(hex_after(LISTING, 2).is_none());
    }

    #[test]
    fn hex_before_collects_backward() {
        let run = hex_before(LISTING, 4).unwrap();
        assert_eq!((run.start, run.end), (3, 4));
        assert_eq!(run.bytes, hex_after(LISTING, 3).unwrap().bytes);
    }

    #[test]
    fn next_run_skips_the_current_block() {
        let from_decl = next_hex_run(LISTING, 6).unwrap();
        assert_eq!(from_decl.start, 7);
        let after = next_hex_run(LISTING, 7).unwrap();
        assert_eq!(after.start, 9);
        assert!(next_hex_run(LISTING, 9).is_none());
    }

    #[test]
    fn previous_run_skips_the_current_block() {
        let prev = previous_hex_run(LISTING, 7).unwrap();
        assert_eq!((prev.start, prev.end), (3, 4));
        assert!(previous_hex_run(LISTING, 3).is_none());
    }

    #[test]
    fn tolerates_listings_without_rows() {
        let lines = ["DefinitionBlock (\"\", \"SSDT\", 2, \"X\", \"Y\", 0)", "{", "}"];
        assert!(hex_after(&lines, 0).is_none());
        assert!(next_hex_run(&lines, 0).is_none());
        assert!(previous_hex_run(&lines, 2).is_none());
        assert_eq!(locate(&lines, 1), None);
        let empty: [&str; 0] = [];
        assert!(previous_hex_run(&empty, 0).is_none());
    }

    #[test]
    fn locate_uses_labels_then_row_lengths() {
        assert_eq!(locate(LISTING, 4), Some(0x2B));
        assert_eq!(locate(LISTING, 6), Some(0x33));
        assert_eq!(locate(LISTING, 8), Some(0x3A));
        assert_eq!(locate(LISTING, 0), None);
    }

    #[test]
    fn formatted_rows_parse_back() {
        let line = format_row(0x1F0, &[0x5F, 0x53, 0x54, 0x41]);
        assert_eq!(line, "   01F0: 5F 53 54 41");
        let row = parse_hex_row(&line).unwrap();
        assert_eq!(row.address, 0x1F0);
    }

    #[test]
    fn hex_string_codec() {
        assert_eq!(decode_hex("5F53 5441").unwrap(), b"_STA");
        assert_eq!(encode_hex(b"XSTA"), "58535441");
        assert_eq!(decode_hex("5F5"), Err(HexError::OddLength));
        assert_eq!(decode_hex("5G"), Err(HexError::InvalidDigit(1)));
    }
}
