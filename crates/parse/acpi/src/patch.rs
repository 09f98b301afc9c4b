//! Unique find/replace patch synthesis.
//!
//! A binary patch is only safe to apply at table-load time if its find
//! pattern matches exactly one location in the table. Given a short
//! pattern (typically a 4-byte name) and the listing line where the
//! intended occurrence lives, [`unique_pad`] grows a window of surrounding
//! bytes, pulling in neighbouring hex runs as needed, until the padded
//! pattern occurs exactly once in the raw table.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::hex::{hex_after, hex_before, is_hex_row, next_hex_run, previous_hex_run};

/// Errors from patch synthesis.
///
/// [`PatchError::InstanceOutOfRange`] and [`PatchError::EmptyPattern`] are
/// caller bugs. Everything else means this one patch cannot be made unique
/// and should be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The find pattern is empty.
    EmptyPattern,
    /// The starting line is not a hex row.
    NoHexAt {
        /// The line that was asked for.
        line: usize,
    },
    /// The pattern does not occur in the hex near the starting line.
    PatternNotFound {
        /// The line the search started from.
        line: usize,
    },
    /// The requested occurrence does not exist in the starting window.
    InstanceOutOfRange {
        /// Zero-based occurrence that was asked for.
        requested: usize,
        /// Number of occurrences actually present.
        available: usize,
    },
    /// The padded pattern does not occur in the raw table at all, so no
    /// amount of context can make it unique.
    NotInTable,
    /// The listing ran out of hex before the pattern became unique.
    EndOfTable,
    /// No growth direction produced a unique pattern.
    NoUniquePad,
    /// A name that cannot be encoded as a 4-byte name segment.
    InvalidName(String),
    /// Find and replace differ in length.
    LengthMismatch {
        /// Length of the find bytes.
        find: usize,
        /// Length of the replace bytes.
        replace: usize,
    },
}

impl PatchError {
    /// Returns `true` if the caller should skip this patch and carry on.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::EmptyPattern
                | Self::InstanceOutOfRange { .. }
                | Self::InvalidName(_)
                | Self::LengthMismatch { .. }
        )
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPattern => write!(f, "find pattern is empty"),
            Self::NoHexAt { line } => write!(f, "no hex row at line {line}"),
            Self::PatternNotFound { line } => {
                write!(f, "pattern not found in the hex following line {line}")
            }
            Self::InstanceOutOfRange {
                requested,
                available,
            } => write!(
                f,
                "occurrence {requested} requested but only {available} present"
            ),
            Self::NotInTable => write!(f, "padded pattern does not occur in the table"),
            Self::EndOfTable => write!(f, "hit the end of the table before the pattern was unique"),
            Self::NoUniquePad => write!(f, "no unique padding found in any direction"),
            Self::InvalidName(name) => write!(f, "'{name}' is not a valid 4-character name"),
            Self::LengthMismatch { find, replace } => write!(
                f,
                "find is {find} bytes but replace is {replace} bytes"
            ),
        }
    }
}

impl core::error::Error for PatchError {}

/// Which side(s) of the pattern may grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Alternate, always growing the side with less padding (right on ties).
    #[default]
    Both,
    /// Only prepend preceding bytes.
    Left,
    /// Only append following bytes.
    Right,
}

/// Context bytes wrapped around a pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pad {
    /// Bytes placed before the pattern.
    pub left: Vec<u8>,
    /// Bytes placed after the pattern.
    pub right: Vec<u8>,
}

impl Pad {
    /// Total padding in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    /// Returns `true` if no padding is needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `left + core + right`.
    #[must_use]
    pub fn wrap(&self, core: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() + core.len());
        out.extend_from_slice(&self.left);
        out.extend_from_slice(core);
        out.extend_from_slice(&self.right);
        out
    }
}

/// Non-overlapping occurrences of `needle` in `haystack`, left to right.
#[must_use]
pub fn occurrences(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut hits = Vec::new();
    if needle.is_empty() {
        return hits;
    }
    let mut pos = 0;
    while pos + needle.len() <= haystack.len() {
        if &haystack[pos..pos + needle.len()] == needle {
            hits.push(pos);
            pos += needle.len();
        } else {
            pos += 1;
        }
    }
    hits
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
#[must_use]
pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    occurrences(haystack, needle).len()
}

/// Grow padding around one occurrence of `find` until it is unique in `raw`.
///
/// `start_line` is either a hex row or a source line; a source line
/// anchors at the next hex run below it, the bytes that declaration
/// compiled to. The search window starts at the anchor row and reaches
/// the end of its run (plus up to `find.len()` bytes of the following
/// runs, for an occurrence that straddles them). `instance` selects which
/// occurrence in that window is meant. Rows of the same run above the
/// anchor still supply left padding.
///
/// # Errors
///
/// See [`PatchError`]. Only [`PatchError::InstanceOutOfRange`] and
/// [`PatchError::EmptyPattern`] indicate a caller bug.
pub fn unique_pad<L: AsRef<str>>(
    lines: &[L],
    raw: &[u8],
    find: &[u8],
    start_line: usize,
    direction: Direction,
    instance: usize,
) -> Result<Pad, PatchError> {
    if find.is_empty() {
        return Err(PatchError::EmptyPattern);
    }
    let anchored = match lines.get(start_line) {
        Some(line) if is_hex_row(line.as_ref()) => hex_after(lines, start_line),
        Some(_) => next_hex_run(lines, start_line),
        None => None,
    };
    let first = anchored.ok_or(PatchError::NoHexAt { line: start_line })?;
    let first_len = first.bytes.len();
    let mut first_row = first.start;
    let mut last_row = first.end;
    let mut window = first.bytes;

    while count_occurrences(&window, find) == 0 && window.len() < first_len + find.len() {
        let next = next_hex_run(lines, last_row)
            .ok_or(PatchError::PatternNotFound { line: start_line })?;
        window.extend_from_slice(&next.bytes);
        last_row = next.end;
    }

    let hits = occurrences(&window, find);
    if hits.is_empty() {
        return Err(PatchError::PatternNotFound { line: start_line });
    }
    let at = *hits.get(instance).ok_or(PatchError::InstanceOutOfRange {
        requested: instance,
        available: hits.len(),
    })?;

    let above = first_row
        .checked_sub(1)
        .and_then(|row| hex_before(lines, row));
    let mut left_rest = match above {
        Some(above) => {
            first_row = above.start;
            above.bytes
        }
        None => Vec::new(),
    };
    left_rest.extend_from_slice(&window[..at]);
    let mut right_rest = window[at + find.len()..].to_vec();
    let mut right_pos = 0;
    let mut pad = Pad::default();

    loop {
        match count_occurrences(raw, &pad.wrap(find)) {
            1 => return Ok(pad),
            0 => return Err(PatchError::NotInTable),
            _ => {}
        }

        let grow_right = match direction {
            Direction::Right => true,
            Direction::Left => false,
            Direction::Both => pad.right.len() <= pad.left.len(),
        };

        if grow_right {
            if right_pos == right_rest.len() {
                let next = next_hex_run(lines, last_row).ok_or(PatchError::EndOfTable)?;
                right_rest = next.bytes;
                right_pos = 0;
                last_row = next.end;
            }
            pad.right.push(right_rest[right_pos]);
            right_pos += 1;
        } else {
            let byte = match left_rest.pop() {
                Some(b) => b,
                None => {
                    let prev = previous_hex_run(lines, first_row).ok_or(PatchError::EndOfTable)?;
                    first_row = prev.start;
                    left_rest = prev.bytes;
                    left_rest.pop().ok_or(PatchError::EndOfTable)?
                }
            };
            pad.left.insert(0, byte);
        }
    }
}

/// Try bidirectional, left-only and right-only growth and keep the
/// shortest total padding. Ties keep the earlier result, so bidirectional
/// wins a tie.
///
/// # Errors
///
/// Caller bugs ([`PatchError::InstanceOutOfRange`],
/// [`PatchError::EmptyPattern`]) are returned immediately; if every
/// direction fails otherwise, returns [`PatchError::NoUniquePad`].
pub fn shortest_unique_pad<L: AsRef<str>>(
    lines: &[L],
    raw: &[u8],
    find: &[u8],
    start_line: usize,
    instance: usize,
) -> Result<Pad, PatchError> {
    let mut best: Option<Pad> = None;
    for direction in [Direction::Both, Direction::Left, Direction::Right] {
        match unique_pad(lines, raw, find, start_line, direction, instance) {
            Ok(pad) => {
                if best.as_ref().is_none_or(|b| pad.len() < b.len()) {
                    best = Some(pad);
                }
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(_) => {}
        }
    }
    best.ok_or(PatchError::NoUniquePad)
}

/// A find/replace patch against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Human-readable label.
    pub comment: String,
    /// Full find bytes, padding included.
    pub find: Vec<u8>,
    /// Full replace bytes, padding included.
    pub replace: Vec<u8>,
    /// Optional find mask.
    pub mask: Option<Vec<u8>>,
    /// The padding that was added around the core pattern.
    pub pad: Pad,
    /// Which occurrence in the starting window the patch targets.
    pub instance: usize,
    /// Whether the patch should be applied.
    pub enabled: bool,
}

impl Patch {
    /// Build a patch by wrapping `find` and `replace` in the same padding.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::LengthMismatch`] if the core patterns differ in
    /// length.
    pub fn padded(
        comment: impl Into<String>,
        find: &[u8],
        replace: &[u8],
        pad: Pad,
        instance: usize,
    ) -> Result<Self, PatchError> {
        if find.len() != replace.len() {
            return Err(PatchError::LengthMismatch {
                find: find.len(),
                replace: replace.len(),
            });
        }
        Ok(Self {
            comment: comment.into(),
            find: pad.wrap(find),
            replace: pad.wrap(replace),
            mask: None,
            pad,
            instance,
            enabled: true,
        })
    }

    /// A patch used as-is, without synthesized padding.
    #[must_use]
    pub fn fixed(comment: impl Into<String>, find: Vec<u8>, replace: Vec<u8>) -> Self {
        Self {
            comment: comment.into(),
            find,
            replace,
            mask: None,
            pad: Pad::default(),
            instance: 0,
            enabled: true,
        }
    }

    /// Returns `true` if the find bytes occur exactly once in `raw`.
    #[must_use]
    pub fn is_unique_in(&self, raw: &[u8]) -> bool {
        count_occurrences(raw, &self.find) == 1
    }

    /// Byte offset of the (unique) match in `raw`.
    #[must_use]
    pub fn offset_in(&self, raw: &[u8]) -> Option<usize> {
        match occurrences(raw, &self.find).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Apply the patch to a copy of `raw` if it matches exactly once.
    #[must_use]
    pub fn apply(&self, raw: &[u8]) -> Option<Vec<u8>> {
        let at = self.offset_in(raw)?;
        let mut out = raw.to_vec();
        out.splice(at..at + self.find.len(), self.replace.iter().copied());
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::next_hex_run;
    use crate::table::tests::ListingBuilder;

    const STA: &[u8] = b"_STA";
    const XSTA: &[u8] = b"XSTA";

    /// Three devices, each with an identical `_STA` method.
    fn three_sta_methods() -> (Vec<u8>, Vec<String>) {
        let mut b = ListingBuilder::new(b"DSDT");
        for (name, digit) in [("DEV0", 0x30u8), ("DEV1", 0x31), ("DEV2", 0x32)] {
            b = b
                .source(&format!("    Device ({name})"))
                .aml(&[0x5B, 0x82, 0x44, 0x45, 0x56, digit])
                .source("    {")
                .source("        Method (_STA, 0, NotSerialized)")
                .aml(&[0x14, 0x09, 0x5F, 0x53, 0x54, 0x41, 0x00])
                .source("        {")
                .source("            Return (0x0F)")
                .aml(&[0xA4, 0x0A, 0x0F])
                .source("        }")
                .source("    }");
        }
        b.finish()
    }

    fn method_rows(lines: &[String]) -> Vec<usize> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains("Method (_STA"))
            .filter_map(|(i, _)| next_hex_run(lines, i).map(|r| r.start))
            .collect()
    }

    #[test]
    fn bidirectional_growth_alternates_sides() {
        let (raw, lines) = three_sta_methods();
        let start = method_rows(&lines)[0];
        let pad = unique_pad(&lines, &raw, STA, start, Direction::Both, 0).unwrap();
        assert_eq!(pad.left, vec![0x30, 0x14, 0x09]);
        assert_eq!(pad.right, vec![0x00, 0xA4, 0x0A]);
        assert_eq!(count_occurrences(&raw, &pad.wrap(STA)), 1);
    }

    #[test]
    fn single_sided_growth() {
        let (raw, lines) = three_sta_methods();
        let start = method_rows(&lines)[0];
        let left = unique_pad(&lines, &raw, STA, start, Direction::Left, 0).unwrap();
        assert_eq!(left, Pad { left: vec![0x30, 0x14, 0x09], right: vec![] });
        let right = unique_pad(&lines, &raw, STA, start, Direction::Right, 0).unwrap();
        assert!(right.left.is_empty());
        assert_eq!(right.right.len(), 10);
        assert_eq!(*right.right.last().unwrap(), 0x31);
    }

    #[test]
    fn shortest_pad_renames_only_the_anchored_occurrence() {
        let (raw, lines) = three_sta_methods();
        assert_eq!(count_occurrences(&raw, STA), 3);

        for (i, start) in method_rows(&lines).into_iter().enumerate() {
            let pad = shortest_unique_pad(&lines, &raw, STA, start, 0).unwrap();
            assert_eq!(pad.len(), 3);
            let patch = Patch::padded("_STA to XSTA", STA, XSTA, pad, 0).unwrap();
            assert!(patch.is_unique_in(&raw));

            let interior = patch.pad.left.len()..patch.pad.left.len() + STA.len();
            for (j, (f, r)) in patch.find.iter().zip(&patch.replace).enumerate() {
                if interior.contains(&j) {
                    continue;
                }
                assert_eq!(f, r);
            }
            assert_eq!(&patch.replace[interior], XSTA);

            let patched = patch.apply(&raw).unwrap();
            assert_eq!(count_occurrences(&patched, STA), 2);
            let renamed_at = occurrences(&patched, XSTA)[0];
            assert_eq!(occurrences(&raw, STA)[i], renamed_at);
        }
    }

    #[test]
    fn instance_out_of_range_is_a_caller_bug() {
        let (raw, lines) = three_sta_methods();
        let start = method_rows(&lines)[0];
        let err = shortest_unique_pad(&lines, &raw, STA, start, 1).unwrap_err();
        assert_eq!(
            err,
            PatchError::InstanceOutOfRange {
                requested: 1,
                available: 1
            }
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn start_needs_a_hex_run_at_or_below_it() {
        let (raw, lines) = three_sta_methods();
        let last = lines.len() - 1;
        assert_eq!(
            unique_pad(&lines, &raw, STA, last, Direction::Both, 0),
            Err(PatchError::NoHexAt { line: last })
        );
        assert_eq!(
            unique_pad(&lines, &raw, STA, lines.len(), Direction::Both, 0),
            Err(PatchError::NoHexAt { line: lines.len() })
        );
    }

    #[test]
    fn declaration_line_anchors_at_its_bytes() {
        let (raw, lines) = three_sta_methods();
        let declarations: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains("Method (_STA"))
            .map(|(i, _)| i)
            .collect();
        for (declaration, row) in declarations.into_iter().zip(method_rows(&lines)) {
            assert!(!is_hex_row(&lines[declaration]));
            for direction in [Direction::Both, Direction::Left, Direction::Right] {
                assert_eq!(
                    unique_pad(&lines, &raw, STA, declaration, direction, 0),
                    unique_pad(&lines, &raw, STA, row, direction, 0)
                );
            }
        }
    }

    #[test]
    fn rows_above_a_mid_run_start_supply_left_padding() {
        let mut head = vec![0x10; 14];
        head.extend_from_slice(&[0x8E, 0x77]);
        let (mut raw, lines) = ListingBuilder::new(b"SSDT")
            .source("    Scope (_SB)")
            .aml(&head)
            .aml(&[0x5F, 0x53, 0x54, 0x41, 0x00])
            .finish();
        raw.extend_from_slice(&[0x55, 0x5F, 0x53, 0x54, 0x41, 0x00]);

        let second_row = lines.iter().rposition(|l| is_hex_row(l)).unwrap();
        assert!(is_hex_row(&lines[second_row - 1]));

        let pad = unique_pad(&lines, &raw, STA, second_row, Direction::Left, 0).unwrap();
        assert_eq!(pad, Pad { left: vec![0x77], right: vec![] });
        assert_eq!(count_occurrences(&raw, &pad.wrap(STA)), 1);
    }

    #[test]
    fn pattern_spanning_two_runs_is_found() {
        let (raw, lines) = ListingBuilder::new(b"SSDT")
            .source("    Name (_STA, 0x0F)")
            .aml(&[0x08, 0x5F, 0x53])
            .source("    // split")
            .aml(&[0x54, 0x41, 0x0A, 0x0F])
            .finish();
        let start = next_hex_run(&lines, 2).unwrap().start;
        let pad = unique_pad(&lines, &raw, STA, start, Direction::Both, 0).unwrap();
        assert!(pad.is_empty());
    }

    #[test]
    fn exhausting_the_listing_is_recoverable() {
        // Only the first copy is listed, so no context can separate them.
        let (mut raw, lines) = ListingBuilder::new(b"SSDT")
            .source("    Name (_STA, One)")
            .aml(STA)
            .finish();
        raw.extend_from_slice(STA);
        let start = next_hex_run(&lines, 2).unwrap().start;
        for direction in [Direction::Both, Direction::Left, Direction::Right] {
            let err = unique_pad(&lines, &raw, STA, start, direction, 0).unwrap_err();
            assert_eq!(err, PatchError::EndOfTable);
            assert!(err.is_recoverable());
        }
        assert_eq!(
            shortest_unique_pad(&lines, &raw, STA, start, 0),
            Err(PatchError::NoUniquePad)
        );
    }

    #[test]
    fn listing_bytes_missing_from_raw() {
        let (_, lines) = ListingBuilder::new(b"SSDT")
            .source("    Name (_STA, One)")
            .aml(STA)
            .finish();
        let start = next_hex_run(&lines, 2).unwrap().start;
        let err = unique_pad(&lines, b"nothing here", STA, start, Direction::Both, 0);
        assert_eq!(err, Err(PatchError::NotInTable));
    }

    #[test]
    fn occurrence_counting_is_non_overlapping() {
        assert_eq!(count_occurrences(b"AAAA", b"AA"), 2);
        assert_eq!(count_occurrences(b"AAA", b"AA"), 1);
        assert_eq!(occurrences(b"xABxAB", b"AB"), vec![1, 4]);
        assert_eq!(count_occurrences(b"abc", b""), 0);
    }

    #[test]
    fn padded_requires_equal_lengths() {
        assert_eq!(
            Patch::padded("bad", b"_STA", b"XSTAX", Pad::default(), 0),
            Err(PatchError::LengthMismatch { find: 4, replace: 5 })
        );
    }
}
