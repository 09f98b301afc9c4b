//! Byte-level fixes for tables the disassembler rejects.
//!
//! Some vendor firmware ships DSDTs that declare the same object twice in
//! one scope. The disassembler refuses those tables outright, so they are
//! patched at the byte level first: each [`PrePatch`] renames one of the
//! duplicates. A fix only applies when its find pattern occurs exactly once,
//! which also makes re-applying it a no-op.

use alloc::borrow::Cow;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::patch::{Patch, count_occurrences, occurrences};

/// A fixed find/replace pair addressing one known firmware bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrePatch {
    /// Short description of the bug, used in progress output.
    pub label: Cow<'static, str>,
    /// Comment carried into the emitted patch record.
    pub comment: Cow<'static, str>,
    /// Bytes to find.
    pub find: Cow<'static, [u8]>,
    /// Bytes to replace them with.
    pub replace: Cow<'static, [u8]>,
}

impl PrePatch {
    /// Build a fix from owned parts.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        comment: impl Into<String>,
        find: Vec<u8>,
        replace: Vec<u8>,
    ) -> Self {
        Self {
            label: Cow::Owned(label.into()),
            comment: Cow::Owned(comment.into()),
            find: Cow::Owned(find),
            replace: Cow::Owned(replace),
        }
    }

    /// Returns `true` if the fix applies to `raw` as it stands.
    #[must_use]
    pub fn applies_to(&self, raw: &[u8]) -> bool {
        self.find.len() == self.replace.len() && count_occurrences(raw, &self.find) == 1
    }

    /// Apply the fix in place. Returns `false`, leaving `raw` untouched,
    /// unless the find pattern occurs exactly once.
    pub fn apply(&self, raw: &mut [u8]) -> bool {
        if self.find.len() != self.replace.len() {
            return false;
        }
        let at = match occurrences(raw, &self.find).as_slice() {
            [only] => *only,
            _ => return false,
        };
        raw[at..at + self.replace.len()].copy_from_slice(&self.replace);
        true
    }

    /// The fix as a patch record for the bootloader config.
    #[must_use]
    pub fn to_patch(&self) -> Patch {
        Patch::fixed(
            self.comment.to_string(),
            self.find.to_vec(),
            self.replace.to_vec(),
        )
    }
}

const fn builtin(
    label: &'static str,
    comment: &'static str,
    find: &'static [u8],
    replace: &'static [u8],
) -> PrePatch {
    PrePatch {
        label: Cow::Borrowed(label),
        comment: Cow::Borrowed(comment),
        find: Cow::Borrowed(find),
        replace: Cow::Borrowed(replace),
    }
}

/// Known vendor duplicate-name bugs, in the order they are tried.
pub const KNOWN_FIXES: &[PrePatch] = &[
    builtin(
        "GPP7 duplicate _PRW methods",
        "GPP7._PRW to XPRW to fix Gigabyte's Mistake",
        &[
            0x37, 0x08, 0x58, 0x48, 0x47, 0x50, 0x0A, 0x02, 0x14, 0x06, 0x53, 0x52, 0x45, 0x47,
            0x02, 0x14, 0x06, 0x53, 0x50, 0x52, 0x57, 0x01, 0x08, 0x5F, 0x50, 0x52, 0x57,
        ],
        &[
            0x37, 0x08, 0x58, 0x48, 0x47, 0x50, 0x0A, 0x02, 0x14, 0x06, 0x53, 0x52, 0x45, 0x47,
            0x02, 0x14, 0x06, 0x53, 0x50, 0x52, 0x57, 0x01, 0x08, 0x58, 0x50, 0x52, 0x57,
        ],
    ),
    builtin(
        "GPP7 duplicate UP00 devices",
        "GPP7.UP00 to UPXX to fix Gigabyte's Mistake",
        &[
            0x10, 0x47, 0x05, 0x2F, 0x03, 0x5F, 0x53, 0x42, 0x5F, 0x50, 0x43, 0x49, 0x30, 0x47,
            0x50, 0x50, 0x37, 0x5B, 0x82, 0x45, 0x04, 0x55, 0x50, 0x30, 0x30,
        ],
        &[
            0x10, 0x47, 0x05, 0x2F, 0x03, 0x5F, 0x53, 0x42, 0x5F, 0x50, 0x43, 0x49, 0x30, 0x47,
            0x50, 0x50, 0x37, 0x5B, 0x82, 0x45, 0x04, 0x55, 0x50, 0x58, 0x58,
        ],
    ),
    builtin(
        "GPP6 duplicate _PRW methods",
        "GPP6._PRW to XPRW to fix ASRock's Mistake",
        &[
            0x47, 0x50, 0x50, 0x36, 0x08, 0x5F, 0x41, 0x44, 0x52, 0x0C, 0x04, 0x00, 0x02, 0x00,
            0x14, 0x0F, 0x5F, 0x50, 0x52, 0x57,
        ],
        &[
            0x47, 0x50, 0x50, 0x36, 0x08, 0x5F, 0x41, 0x44, 0x52, 0x0C, 0x04, 0x00, 0x02, 0x00,
            0x14, 0x0F, 0x58, 0x50, 0x52, 0x57,
        ],
    ),
    builtin(
        "GPP1 duplicate PTXH devices",
        "GPP1.PTXH to XTXH to fix MSI's Mistake",
        &[
            0x50, 0x54, 0x58, 0x48, 0x08, 0x5F, 0x41, 0x44, 0x52, 0x00, 0x14, 0x0F,
        ],
        &[
            0x58, 0x54, 0x58, 0x48, 0x08, 0x5F, 0x41, 0x44, 0x52, 0x00, 0x14, 0x0F,
        ],
    ),
];

/// Why a repair did not produce a loadable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairError {
    /// None of the fixes matched the table exactly once.
    NoApplicableFix,
    /// Fixes were applied, but the table still would not load.
    Exhausted {
        /// Labels of the fixes that were applied, in order.
        applied: Vec<String>,
    },
}

impl fmt::Display for RepairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoApplicableFix => write!(f, "no known fix matches this table"),
            Self::Exhausted { applied } => {
                write!(f, "table still fails after applying: {}", applied.join(", "))
            }
        }
    }
}

impl core::error::Error for RepairError {}

/// A successfully repaired table image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    /// The patched bytes.
    pub raw: Vec<u8>,
    /// The fixes that were applied, as patch records.
    pub applied: Vec<Patch>,
}

/// Apply `fixes` one at a time until `loads` accepts the result.
///
/// Fixes accumulate: each applicable fix is applied on top of the previous
/// ones and `loads` is checked after every application, stopping at the
/// first success. The input buffer is never modified.
///
/// # Errors
///
/// Returns [`RepairError`] when no fix applies or none restores loading.
pub fn repair<F>(raw: &[u8], fixes: &[PrePatch], mut loads: F) -> Result<Repaired, RepairError>
where
    F: FnMut(&PrePatch, &[u8]) -> bool,
{
    let mut work = raw.to_vec();
    let mut applied = Vec::new();
    for fix in fixes {
        if !fix.apply(&mut work) {
            continue;
        }
        applied.push(fix);
        if loads(fix, &work) {
            return Ok(Repaired {
                raw: work,
                applied: applied.into_iter().map(PrePatch::to_patch).collect(),
            });
        }
    }
    if applied.is_empty() {
        Err(RepairError::NoApplicableFix)
    } else {
        Err(RepairError::Exhausted {
            applied: applied.iter().map(|f| f.label.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdt::tests::make_table;

    fn with_fix(index: usize) -> Vec<u8> {
        let mut body = vec![0xA3, 0xA3];
        body.extend_from_slice(&KNOWN_FIXES[index].find);
        body.extend_from_slice(&[0xA3, 0xA3]);
        make_table(b"DSDT", &body)
    }

    #[test]
    fn builtin_fixes_are_well_formed() {
        assert_eq!(KNOWN_FIXES.len(), 4);
        for fix in KNOWN_FIXES {
            assert_eq!(fix.find.len(), fix.replace.len(), "{}", fix.label);
            assert_ne!(fix.find, fix.replace);
        }
    }

    #[test]
    fn applies_once_then_becomes_a_no_op() {
        let mut raw = with_fix(3);
        assert!(KNOWN_FIXES[3].apply(&mut raw));
        let once = raw.clone();
        assert!(!KNOWN_FIXES[3].apply(&mut raw));
        assert_eq!(raw, once);
        assert_eq!(count_occurrences(&raw, b"XTXH"), 1);
    }

    #[test]
    fn ambiguous_pattern_is_left_alone() {
        let mut raw = with_fix(2);
        raw.extend_from_slice(&KNOWN_FIXES[2].find);
        let before = raw.clone();
        assert!(!KNOWN_FIXES[2].apply(&mut raw));
        assert_eq!(raw, before);
    }

    #[test]
    fn repair_stops_at_first_loadable_result() {
        let mut body = KNOWN_FIXES[0].find.to_vec();
        body.extend_from_slice(&KNOWN_FIXES[1].find);
        body.extend_from_slice(&KNOWN_FIXES[3].find);
        let raw = make_table(b"DSDT", &body);

        let mut attempts = Vec::new();
        let repaired = repair(&raw, KNOWN_FIXES, |fix, _| {
            attempts.push(fix.label.to_string());
            attempts.len() == 2
        })
        .unwrap();

        assert_eq!(
            attempts,
            vec![KNOWN_FIXES[0].label.clone(), KNOWN_FIXES[1].label.clone()]
        );
        assert_eq!(repaired.applied.len(), 2);
        assert_eq!(repaired.applied[1].comment, KNOWN_FIXES[1].comment);
        // The PTXH fix was never reached.
        assert_eq!(count_occurrences(&repaired.raw, b"PTXH"), 1);
        assert_eq!(count_occurrences(&repaired.raw, b"UPXX"), 1);
    }

    #[test]
    fn repair_reports_what_it_tried() {
        let raw = with_fix(0);
        let err = repair(&raw, KNOWN_FIXES, |_, _| false).unwrap_err();
        assert_eq!(
            err,
            RepairError::Exhausted {
                applied: vec![KNOWN_FIXES[0].label.to_string()]
            }
        );
        let clean = make_table(b"DSDT", &[0xA3]);
        assert_eq!(
            repair(&clean, KNOWN_FIXES, |_, _| true),
            Err(RepairError::NoApplicableFix)
        );
    }
}
