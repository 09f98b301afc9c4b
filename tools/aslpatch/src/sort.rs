//! Natural ("human") ordering for table file names.
//!
//! `SSDT2.aml` sorts before `SSDT10.aml`: names are split into alternating
//! text and digit runs, text compares case-insensitively and digit runs
//! compare by numeric value.

use std::cmp::Ordering;

#[derive(Debug)]
enum Chunk<'a> {
    Text(String),
    Digits(&'a str),
}

impl PartialEq for Chunk<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Chunk<'_> {}

impl Ord for Chunk<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
            (Chunk::Digits(a), Chunk::Digits(b)) => {
                let a = a.trim_start_matches('0');
                let b = b.trim_start_matches('0');
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            // Keys always alternate text/digits from the same starting
            // kind, so mixed pairs only appear on malformed input.
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Chunk<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split a name into its comparison key.
///
/// The key always starts with a (possibly empty) text chunk so that two
/// keys line up chunk for chunk.
fn natural_key(name: &str) -> Vec<Chunk<'_>> {
    let mut key = Vec::new();
    let mut rest = name;
    loop {
        let digits_at = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        key.push(Chunk::Text(rest[..digits_at].to_lowercase()));
        rest = &rest[digits_at..];
        if rest.is_empty() {
            break;
        }
        let text_at = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        key.push(Chunk::Digits(&rest[..text_at]));
        rest = &rest[text_at..];
    }
    key
}

/// Compare two names in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b))
}

/// Sort names in place in natural order.
pub fn sort_naturally<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}
