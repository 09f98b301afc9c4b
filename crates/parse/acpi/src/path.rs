//! Fully-qualified object paths recovered from a disassembled listing.
//!
//! [`build_paths`] walks the source lines of a listing once, tracking the
//! running `{`/`}` balance and a stack of enclosing declarations, and
//! emits one [`PathEntry`] per `Device`, `Method`, `Name` and `Processor`
//! declaration. `Scope` declarations qualify their children but are never
//! emitted themselves.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::hex::is_hex_row;

/// A 4-byte AML name segment (e.g., `_SB_`, `PCI0`, `_HID`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameSeg(pub [u8; 4]);

impl NameSeg {
    /// Create a `NameSeg` from a 4-byte slice.
    ///
    /// Returns `None` if the slice is shorter than 4 bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut seg = [0u8; 4];
        seg.copy_from_slice(bytes.get(..4)?);
        Some(Self(seg))
    }

    /// Build a segment from a display name, padding it with `_` to 4 bytes.
    ///
    /// Leading `\` and `^` prefixes are ignored. Returns `None` for empty,
    /// non-ASCII, or over-long names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches(['\\', '^']);
        if name.is_empty() || name.len() > 4 || !name.is_ascii() {
            return None;
        }
        let mut seg = *b"____";
        seg[..name.len()].copy_from_slice(name.as_bytes());
        Some(Self(seg))
    }

    /// Returns the name as a UTF-8 string (ACPI names are always ASCII).
    #[must_use]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("")
    }

    /// Returns the raw 4 bytes as they appear in AML.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameSeg(\"{}\")", self.as_str())
    }
}

impl fmt::Display for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a declared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// A `Device (...)` declaration.
    Device,
    /// A `Method (...)` declaration.
    Method,
    /// A `Name (...)` declaration.
    Name,
    /// A legacy `Processor (...)` declaration.
    Processor,
    /// A `Scope (...)` block.
    Scope,
}

impl ObjectKind {
    /// All kinds, in keyword order.
    pub const ALL: [Self; 5] = [
        Self::Processor,
        Self::Scope,
        Self::Device,
        Self::Method,
        Self::Name,
    ];

    /// The ASL keyword that opens this kind of declaration.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Device => "Device",
            Self::Method => "Method",
            Self::Name => "Name",
            Self::Processor => "Processor",
            Self::Scope => "Scope",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Error returned when parsing an unknown [`ObjectKind`] name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown object kind '{}' (expected device, method, name, processor or scope)",
            self.0
        )
    }
}

impl core::error::Error for UnknownKind {}

impl FromStr for ObjectKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.keyword().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// A declaration line found in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// What was declared.
    pub kind: ObjectKind,
    /// The name exactly as written (may be relative, absolute, or carets).
    pub name: String,
    /// Line index of the declaration.
    pub line: usize,
}

/// A fully-qualified object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    /// Dot-separated path with a leading `\`, padding underscores stripped
    /// from every segment (e.g. `\_SB.PCI0.LPCB.EC0._STA`).
    pub path: String,
    /// Kind of the declared object.
    pub kind: ObjectKind,
    /// Line index of the declaration in the listing.
    pub line: usize,
    /// Brace nesting depth at the declaration.
    pub depth: usize,
}

impl PathEntry {
    /// Path segments without the leading `\`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.trim_start_matches('\\').split('.')
    }

    /// The final segment, as displayed.
    #[must_use]
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// The final segment padded back to its 4 AML bytes.
    #[must_use]
    pub fn name_seg(&self) -> Option<NameSeg> {
        NameSeg::from_name(self.name())
    }
}

/// Strip a trailing `//` comment and a leading line label from a source line.
///
/// A label is a single alphanumeric token followed by `:` at the start of
/// the line (an address or line number). Colons further into the line, such
/// as inside string literals, are left alone.
#[must_use]
pub fn strip_source_line(line: &str) -> &str {
    let line = match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    };
    if let Some(colon) = line.find(':') {
        let label = line[..colon].trim();
        if !label.is_empty() && label.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return &line[colon + 1..];
        }
    }
    line
}

/// Recognize a declaration on a (comment-stripped) source line.
///
/// When a line holds several declaration keywords, the rightmost one with a
/// non-empty name wins. The name runs up to the next `,` or `)`.
#[must_use]
pub fn parse_declaration(line: &str) -> Option<(ObjectKind, &str)> {
    let mut hits: Vec<(usize, ObjectKind)> = Vec::new();
    for kind in ObjectKind::ALL {
        let needle = [kind.keyword(), " ("].concat();
        hits.extend(line.match_indices(needle.as_str()).map(|(pos, _)| (pos, kind)));
    }
    hits.sort_by(|a, b| b.0.cmp(&a.0));

    hits.into_iter().find_map(|(pos, kind)| {
        let start = pos + kind.keyword().len() + 2;
        let rest = &line[start..];
        let end = rest.find([',', ')']).unwrap_or(rest.len());
        (end > 0).then(|| (kind, &rest[..end]))
    })
}

/// List every declaration line in a listing, in line order.
///
/// Hex rows are skipped. Scopes are included.
#[must_use]
pub fn declarations<L: AsRef<str>>(lines: &[L]) -> Vec<Declaration> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !is_hex_row(l.as_ref()))
        .filter_map(|(line, l)| {
            parse_declaration(strip_source_line(l.as_ref())).map(|(kind, name)| Declaration {
                kind,
                name: name.to_string(),
                line,
            })
        })
        .collect()
}

/// One open declaration on the scope stack.
struct Frame {
    name: String,
    balance: isize,
}

/// The chain of declarations enclosing the current line.
struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Close every frame opened at or below the current brace balance.
    fn unwind(&mut self, balance: isize) {
        while self.frames.last().is_some_and(|f| f.balance >= balance) {
            self.frames.pop();
        }
    }

    fn push(&mut self, name: &str, balance: isize) {
        self.frames.push(Frame {
            name: name.to_string(),
            balance,
        });
    }

    /// Resolve the innermost frame to a displayable absolute path.
    ///
    /// Walks outward until a frame that is already rooted (`\...`, `_SB`,
    /// `_PR`), then applies caret dereferences left to right.
    fn qualify(&self) -> Option<String> {
        let mut chain: Vec<&str> = Vec::new();
        for frame in self.frames.iter().rev() {
            chain.push(&frame.name);
            let head = frame.name.split('.').next().unwrap_or("");
            let head = head.trim_end_matches('_');
            if head.starts_with('\\') || head == "_SB" || head == "_PR" {
                break;
            }
        }
        chain.reverse();

        let joined = chain.join(".");
        let mut parts: Vec<&str> = joined.split('.').collect();
        if parts.first() == Some(&"\\") {
            parts.remove(0);
        }

        let mut resolved: Vec<&str> = Vec::new();
        for part in parts {
            let carets = part.matches('^').count();
            if carets > 0 {
                resolved.truncate(resolved.len().saturating_sub(carets));
                let name = part.trim_start_matches('^');
                if !name.is_empty() {
                    resolved.push(name);
                }
                continue;
            }
            resolved.push(part);
        }
        if resolved.is_empty() {
            return None;
        }

        let mut path = String::from("\\");
        for (i, seg) in resolved.iter().enumerate() {
            if i > 0 {
                path.push('.');
            }
            path.push_str(seg.trim_start_matches('\\').trim_end_matches('_'));
        }
        Some(path)
    }
}

/// Build the sorted path list for a listing.
///
/// The result is a pure function of `lines`: identical listings always
/// yield identical, identically ordered lists.
#[must_use]
pub fn build_paths<L: AsRef<str>>(lines: &[L]) -> Vec<PathEntry> {
    let mut stack = ScopeStack::new();
    let mut balance: isize = 0;
    let mut paths = Vec::new();

    for (index, raw) in lines.iter().enumerate() {
        let raw = raw.as_ref();
        if is_hex_row(raw) {
            continue;
        }
        let line = strip_source_line(raw);
        balance += line.matches('{').count() as isize;
        balance -= line.matches('}').count() as isize;
        stack.unwind(balance);

        let Some((kind, name)) = parse_declaration(line) else {
            continue;
        };
        stack.push(name, balance);
        if kind == ObjectKind::Scope {
            continue;
        }
        if let Some(path) = stack.qualify() {
            paths.push(PathEntry {
                path,
                kind,
                line: index,
                depth: balance.max(0) as usize,
            });
        }
    }

    paths.sort_by(|a, b| (&a.path, a.line, a.kind).cmp(&(&b.path, b.line, b.kind)));
    paths
}

/// Normalize a dotted path for suffix matching: strip padding underscores
/// from each segment and uppercase everything.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for (i, seg) in path.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&seg.trim_end_matches('_').to_ascii_uppercase());
    }
    out
}

/// Whether normalized `path` ends with normalized `suffix` on a segment
/// boundary. A suffix starting with `\\` is absolute and must match the
/// whole path.
#[must_use]
pub fn ends_with_segments(path: &str, suffix: &str) -> bool {
    if suffix.is_empty() {
        return true;
    }
    if suffix.starts_with('\\') {
        return path == suffix;
    }
    match path.strip_suffix(suffix) {
        Some(head) => head.is_empty() || head.ends_with('.') || head.ends_with('\\'),
        None => false,
    }
}
