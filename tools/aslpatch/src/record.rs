//! Patch records in the shape bootloader ACPI patch lists expect.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use aslpatch_acpi::hex::encode_hex;
use aslpatch_acpi::{Patch, Table};
use serde::Serialize;

/// One ACPI patch entry. Byte fields are uppercase hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatchRecord {
    pub comment: String,
    pub find: String,
    pub replace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    pub enabled: bool,
    /// Restricts the patch to tables with this signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_signature: Option<String>,
    /// Restricts the patch to tables with this OEM table id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oem_table_id: Option<String>,
}

impl PatchRecord {
    /// Build a record from a synthesized patch.
    ///
    /// Patches against a table other than the DSDT carry its signature and
    /// table id, since several SSDTs can share byte sequences.
    pub fn from_patch(patch: &Patch, table: Option<&Table>) -> Self {
        let target = table.filter(|t| t.signature() != *b"DSDT");
        Self {
            comment: patch.comment.clone(),
            find: encode_hex(&patch.find),
            replace: encode_hex(&patch.replace),
            mask: patch.mask.as_deref().map(encode_hex),
            enabled: patch.enabled,
            table_signature: target.map(|t| encode_hex(&t.signature())),
            oem_table_id: target.map(|t| encode_hex(&t.table_id())),
        }
    }
}

/// Sort records by comment so output is stable across runs.
pub fn sort_records(records: &mut [PatchRecord]) {
    records.sort_by(|a, b| a.comment.cmp(&b.comment));
}

/// Serialize records as a pretty-printed JSON array.
pub fn to_json(records: &[PatchRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).context("failed to serialize patch records")
}

/// Render records for the terminal.
pub fn render(records: &[PatchRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let _ = writeln!(out, "{}", record.comment);
        let _ = writeln!(out, "  Find:    {}", record.find);
        let _ = writeln!(out, "  Replace: {}", record.replace);
        if let Some(mask) = &record.mask {
            let _ = writeln!(out, "  Mask:    {mask}");
        }
        if let (Some(sig), Some(id)) = (&record.table_signature, &record.oem_table_id) {
            let _ = writeln!(out, "  Table:   {sig} / {id}");
        }
        if !record.enabled {
            let _ = writeln!(out, "  (disabled)");
        }
    }
    out
}
