//! Brace-delimited line spans.
//!
//! A [`ScopeSpan`] bounds the body of one declaration so that searches can
//! be limited to it, e.g. "does this `_STA` reference `STAS`" or "is this
//! method inside a `PowerResource` block".

use alloc::vec::Vec;

use crate::hex::is_hex_row;
use crate::path::strip_source_line;

/// A closed line-index interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSpan {
    /// The declaration line the span starts at.
    pub start: usize,
    /// The line holding the closing brace (or the last line of the listing
    /// when the block never closes).
    pub end: usize,
}

impl ScopeSpan {
    /// Returns `true` if `line` lies inside the span.
    #[must_use]
    pub fn contains(&self, line: usize) -> bool {
        (self.start..=self.end).contains(&line)
    }
}

fn as_str<L: AsRef<str>>(line: &L) -> &str {
    line.as_ref()
}

fn braces(line: &str) -> (isize, isize) {
    let line = strip_source_line(line);
    (
        line.matches('{').count() as isize,
        line.matches('}').count() as isize,
    )
}

/// Find the span of the block opened at or after `start`.
///
/// Counting begins at the first source line holding a `{`; the span ends
/// on the line where the balance drops back to zero. Hex rows never count.
#[must_use]
pub fn scope_span<L: AsRef<str>>(lines: &[L], start: usize) -> Option<ScopeSpan> {
    if start >= lines.len() {
        return None;
    }
    let mut balance: Option<isize> = None;
    for (index, line) in lines.iter().enumerate().skip(start) {
        let line = line.as_ref();
        if is_hex_row(line) {
            continue;
        }
        let (open, close) = braces(line);
        match balance {
            None => {
                if open > 0 {
                    balance = Some(open);
                }
            }
            Some(b) => {
                let b = b + open - close;
                if b <= 0 {
                    return Some(ScopeSpan { start, end: index });
                }
                balance = Some(b);
            }
        }
    }
    Some(ScopeSpan {
        start,
        end: lines.len() - 1,
    })
}

/// The lines of a span.
///
/// Hex rows are dropped unless `include_hex` is set. With `strip_comments`,
/// trailing comments and line labels are removed.
#[must_use]
pub fn scope_lines<L: AsRef<str>>(
    lines: &[L],
    span: ScopeSpan,
    include_hex: bool,
    strip_comments: bool,
) -> Vec<&str> {
    let end = span.end.min(lines.len().saturating_sub(1));
    lines
        .get(span.start..=end)
        .unwrap_or(&[])
        .iter()
        .map(as_str)
        .filter(|l| include_hex || !is_hex_row(l))
        .map(|l| if strip_comments { strip_source_line(l) } else { l })
        .collect()
}

/// Spans of every `PowerResource` block in a listing.
#[must_use]
pub fn power_resource_spans<L: AsRef<str>>(lines: &[L]) -> Vec<ScopeSpan> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| strip_source_line(l.as_ref()).trim().starts_with("PowerResource"))
        .filter_map(|(index, _)| scope_span(lines, index))
        .collect()
}

/// Returns `true` if `line` falls inside any `PowerResource` block.
#[must_use]
pub fn in_power_resource<L: AsRef<str>>(lines: &[L], line: usize) -> bool {
    power_resource_spans(lines)
        .iter()
        .any(|span| span.contains(line))
}
