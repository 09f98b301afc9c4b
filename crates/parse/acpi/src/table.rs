//! One loaded table: raw bytes, header, listing lines and derived indexes.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::hex::{self, HexRun};
use crate::listing::{restore_trailing_rows, split_listing};
use crate::patch::{self, Direction, Pad, Patch, PatchError};
use crate::path::{
    Declaration, NameSeg, ObjectKind, PathEntry, build_paths, declarations, ends_with_segments,
    normalize_path,
};
use crate::scope::{self, ScopeSpan};
use crate::sdt::{SdtError, SdtHeader};

/// A disassembled table.
///
/// Everything except the name, the raw bytes and the listing text is
/// derived on construction, so two tables built from identical inputs are
/// identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    header: SdtHeader,
    raw: Vec<u8>,
    lines: Vec<String>,
    paths: Vec<PathEntry>,
    declarations: Vec<Declaration>,
}

impl Table {
    /// Build a table from its raw image and the disassembler's output.
    ///
    /// The listing is cleaned, split into lines and, if it carries hex rows,
    /// completed with the rows the disassembler left off the end.
    ///
    /// # Errors
    ///
    /// Returns [`SdtError`] if `raw` is too short to hold a header.
    pub fn from_listing(name: impl Into<String>, raw: Vec<u8>, listing: &str) -> Result<Self, SdtError> {
        let header = SdtHeader::parse(&raw)?;
        let mut lines = split_listing(listing);
        let trailing = restore_trailing_rows(&lines, &raw);
        lines.extend(trailing);
        let paths = build_paths(&lines);
        let declarations = declarations(&lines);
        Ok(Self {
            name: name.into(),
            header,
            raw,
            lines,
            paths,
            declarations,
        })
    }

    /// File name the table was loaded under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed header.
    #[must_use]
    pub fn header(&self) -> &SdtHeader {
        &self.header
    }

    /// Signature bytes from the header.
    #[must_use]
    pub fn signature(&self) -> [u8; 4] {
        self.header.signature
    }

    /// OEM table id from the header.
    #[must_use]
    pub fn table_id(&self) -> [u8; 8] {
        self.header.oem_table_id
    }

    /// Raw table bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Listing lines.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns `true` if the listing interleaves hex rows with source.
    #[must_use]
    pub fn is_mixed(&self) -> bool {
        self.lines.iter().any(|l| hex::is_hex_row(l))
    }

    /// Every qualified path, sorted.
    #[must_use]
    pub fn paths(&self) -> &[PathEntry] {
        &self.paths
    }

    /// Every declaration line, scopes included, in line order.
    #[must_use]
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// `Scope (...)` declarations, in line order.
    pub fn scopes(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.kind == ObjectKind::Scope)
    }

    /// Paths of `kind` (or any kind) whose normalized path ends with
    /// `suffix` on a segment boundary, so `EC0` finds `\_SB.EC0` but not
    /// `\_SB.PEC0`. An empty suffix matches everything.
    #[must_use]
    pub fn paths_of(&self, kind: Option<ObjectKind>, suffix: &str) -> Vec<&PathEntry> {
        let suffix = normalize_path(suffix);
        self.paths
            .iter()
            .filter(|p| kind.is_none_or(|k| p.kind == k))
            .filter(|p| ends_with_segments(&normalize_path(&p.path), &suffix))
            .collect()
    }

    /// `Device` paths ending with `suffix`.
    #[must_use]
    pub fn device_paths(&self, suffix: &str) -> Vec<&PathEntry> {
        self.paths_of(Some(ObjectKind::Device), suffix)
    }

    /// `Method` paths ending with `suffix`.
    #[must_use]
    pub fn method_paths(&self, suffix: &str) -> Vec<&PathEntry> {
        self.paths_of(Some(ObjectKind::Method), suffix)
    }

    /// `Name` paths ending with `suffix`.
    #[must_use]
    pub fn name_paths(&self, suffix: &str) -> Vec<&PathEntry> {
        self.paths_of(Some(ObjectKind::Name), suffix)
    }

    /// `Processor` paths ending with `suffix`.
    #[must_use]
    pub fn processor_paths(&self, suffix: &str) -> Vec<&PathEntry> {
        self.paths_of(Some(ObjectKind::Processor), suffix)
    }

    /// Devices whose `_HID` declaration mentions `hid` (case-insensitive).
    #[must_use]
    pub fn devices_with_hid(&self, hid: &str) -> Vec<&PathEntry> {
        let hid = hid.to_ascii_uppercase();
        let mut devices = Vec::new();
        for name in self.name_paths("_HID") {
            let Some(line) = self.lines.get(name.line) else {
                continue;
            };
            if !line.to_ascii_uppercase().contains(&hid) {
                continue;
            }
            let Some((parent, _)) = name.path.rsplit_once('.') else {
                continue;
            };
            devices.extend(
                self.paths
                    .iter()
                    .filter(|p| p.kind == ObjectKind::Device && p.path == parent),
            );
        }
        devices
    }

    /// Span of the block opened by the declaration at `line`.
    #[must_use]
    pub fn scope_span(&self, line: usize) -> Option<ScopeSpan> {
        scope::scope_span(&self.lines, line)
    }

    /// Text of a span. See [`scope::scope_lines`].
    #[must_use]
    pub fn scope_lines(&self, span: ScopeSpan, include_hex: bool, strip_comments: bool) -> Vec<&str> {
        scope::scope_lines(&self.lines, span, include_hex, strip_comments)
    }

    /// Spans of every `PowerResource` block.
    #[must_use]
    pub fn power_resource_spans(&self) -> Vec<ScopeSpan> {
        scope::power_resource_spans(&self.lines)
    }

    /// Returns `true` if `line` is inside a `PowerResource` block.
    #[must_use]
    pub fn in_power_resource(&self, line: usize) -> bool {
        scope::in_power_resource(&self.lines, line)
    }

    /// Byte offset of `line` within the table.
    #[must_use]
    pub fn locate(&self, line: usize) -> Option<usize> {
        hex::locate(&self.lines, line)
    }

    /// The first hex run after the block containing `line`.
    #[must_use]
    pub fn next_hex_run(&self, line: usize) -> Option<HexRun> {
        hex::next_hex_run(&self.lines, line)
    }

    /// The closest hex run before the block containing `line`.
    #[must_use]
    pub fn previous_hex_run(&self, line: usize) -> Option<HexRun> {
        hex::previous_hex_run(&self.lines, line)
    }

    /// See [`patch::unique_pad`].
    ///
    /// # Errors
    ///
    /// See [`PatchError`].
    pub fn unique_pad(
        &self,
        find: &[u8],
        start_line: usize,
        direction: Direction,
        instance: usize,
    ) -> Result<Pad, PatchError> {
        patch::unique_pad(&self.lines, &self.raw, find, start_line, direction, instance)
    }

    /// See [`patch::shortest_unique_pad`].
    ///
    /// # Errors
    ///
    /// See [`PatchError`].
    pub fn shortest_unique_pad(
        &self,
        find: &[u8],
        start_line: usize,
        instance: usize,
    ) -> Result<Pad, PatchError> {
        patch::shortest_unique_pad(&self.lines, &self.raw, find, start_line, instance)
    }

    /// Synthesize a unique patch. `start_line` may be a hex row or a
    /// declaration line as listed by [`Table::paths`]; see
    /// [`patch::unique_pad`]. `direction` of `None` tries all three
    /// directions and keeps the shortest.
    ///
    /// # Errors
    ///
    /// See [`PatchError`].
    pub fn synthesize(
        &self,
        comment: impl Into<String>,
        find: &[u8],
        replace: &[u8],
        start_line: usize,
        direction: Option<Direction>,
        instance: usize,
    ) -> Result<Patch, PatchError> {
        if find.len() != replace.len() {
            return Err(PatchError::LengthMismatch {
                find: find.len(),
                replace: replace.len(),
            });
        }
        let pad = match direction {
            Some(direction) => self.unique_pad(find, start_line, direction, instance)?,
            None => self.shortest_unique_pad(find, start_line, instance)?,
        };
        Patch::padded(comment, find, replace, pad, instance)
    }

    /// Synthesize a patch renaming the final name segment of `entry`.
    ///
    /// The pattern is anchored at the hex run that follows the declaration.
    ///
    /// # Errors
    ///
    /// [`PatchError::InvalidName`] for names that do not fit in a segment,
    /// [`PatchError::NoHexAt`] when the listing has no bytes after the
    /// declaration, otherwise as [`Table::synthesize`].
    pub fn rename_patch(&self, entry: &PathEntry, to: &str) -> Result<Patch, PatchError> {
        let from = entry
            .name_seg()
            .ok_or_else(|| PatchError::InvalidName(entry.name().to_string()))?;
        let to_seg = NameSeg::from_name(to).ok_or_else(|| PatchError::InvalidName(to.to_string()))?;
        let comment = [entry.path.trim_start_matches('\\'), " to ", to_seg.as_str()].concat();
        self.synthesize(comment, from.as_bytes(), to_seg.as_bytes(), entry.line, None, 0)
    }

    /// Absolute offset of `patch` in this table, if it matches exactly once.
    #[must_use]
    pub fn patch_offset(&self, patch: &Patch) -> Option<usize> {
        patch.offset_in(&self.raw)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hex::format_row;
    use crate::sdt::tests::make_table;

    /// Builds a mixed listing and the matching raw image side by side.
    pub(crate) struct ListingBuilder {
        signature: [u8; 4],
        body: Vec<u8>,
        lines: Vec<String>,
    }

    impl ListingBuilder {
        pub(crate) fn new(signature: &[u8; 4]) -> Self {
            let sig = core::str::from_utf8(signature).unwrap();
            Self {
                signature: *signature,
                body: Vec::new(),
                lines: vec![
                    format!(
                        "DefinitionBlock (\"\", \"{sig}\", 2, \"ALASKA\", \"A M I\", 0x01072009)"
                    ),
                    "{".to_string(),
                ],
            }
        }

        pub(crate) fn source(mut self, line: &str) -> Self {
            self.lines.push(line.to_string());
            self
        }

        /// Append AML bytes as 16-byte rows at the next table offset.
        pub(crate) fn aml(mut self, bytes: &[u8]) -> Self {
            for chunk in bytes.chunks(16) {
                let address = SdtHeader::SIZE + self.body.len();
                self.lines.push(format_row(address, chunk));
                self.body.extend_from_slice(chunk);
            }
            self
        }

        pub(crate) fn finish(mut self) -> (Vec<u8>, Vec<String>) {
            self.lines.push("}".to_string());
            (make_table(&self.signature, &self.body), self.lines)
        }

        pub(crate) fn table(self, name: &str) -> Table {
            let (raw, lines) = self.finish();
            Table::from_listing(name, raw, &lines.join("\n")).unwrap()
        }
    }

    fn embedded_controller() -> ListingBuilder {
        ListingBuilder::new(b"DSDT")
            .source("    Scope (_SB)")
            .aml(&[0x10, 0x30, 0x5F, 0x53, 0x42, 0x5F])
            .source("    {")
            .source("        Device (EC0)")
            .aml(&[0x5B, 0x82, 0x28, 0x45, 0x43, 0x30, 0x5F])
            .source("        {")
            .source("            Name (_HID, EisaId (\"PNP0C09\"))  // _HID: Hardware ID")
            .aml(&[0x08, 0x5F, 0x48, 0x49, 0x44, 0x0C, 0x41, 0xD0, 0x0C, 0x09])
            .source("            Method (_STA, 0, NotSerialized)  // _STA: Status")
            .aml(&[0x14, 0x09, 0x5F, 0x53, 0x54, 0x41, 0x00])
            .source("            {")
            .source("                Return (STAS)")
            .aml(&[0xA4, 0x53, 0x54, 0x41, 0x53])
            .source("            }")
            .source("        }")
            .source("    }")
    }

    #[test]
    fn builds_paths_and_header() {
        let table = embedded_controller().table("DSDT");
        assert_eq!(&table.signature(), b"DSDT");
        assert_eq!(&table.table_id(), b"A M I\0\0\0");
        assert!(table.is_mixed());
        let names: Vec<_> = table.paths().iter().map(|p| p.path.as_str()).collect();
        assert_eq!(names, vec!["\\_SB.EC0", "\\_SB.EC0._HID", "\\_SB.EC0._STA"]);
        assert_eq!(table.scopes().count(), 1);
    }

    #[test]
    fn suffix_queries_ignore_padding_and_case() {
        let table = embedded_controller().table("DSDT");
        assert_eq!(table.device_paths("ec0_").len(), 1);
        assert_eq!(table.method_paths("EC0._STA").len(), 1);
        assert!(table.method_paths("EC1._STA").is_empty());
        assert_eq!(table.paths_of(None, "").len(), 3);
        assert!(table.processor_paths("").is_empty());
    }

    #[test]
    fn suffix_queries_stop_at_segment_boundaries() {
        let table = ListingBuilder::new(b"DSDT")
            .source("    Scope (_SB)")
            .aml(&[0x10, 0x20, 0x5F, 0x53, 0x42, 0x5F])
            .source("    {")
            .source("        Device (EC0)")
            .aml(&[0x5B, 0x82, 0x05, 0x45, 0x43, 0x30, 0x5F])
            .source("        {")
            .source("        }")
            .source("        Device (PEC0)")
            .aml(&[0x5B, 0x82, 0x05, 0x50, 0x45, 0x43, 0x30])
            .source("        {")
            .source("        }")
            .source("    }")
            .table("DSDT");
        let ec0: Vec<_> = table.device_paths("EC0").iter().map(|p| p.path.as_str()).collect();
        assert_eq!(ec0, vec!["\\_SB.EC0"]);
        assert_eq!(table.device_paths("PEC0").len(), 1);
        assert_eq!(table.device_paths("\\_SB.EC0").len(), 1);
        assert!(table.device_paths("\\EC0").is_empty());
    }

    #[test]
    fn finds_devices_by_hid() {
        let table = embedded_controller().table("DSDT");
        let devices = table.devices_with_hid("pnp0c09");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].path, "\\_SB.EC0");
        assert!(table.devices_with_hid("PNP0A08").is_empty());
    }

    #[test]
    fn renames_a_method_uniquely() {
        let table = embedded_controller().table("DSDT");
        let sta = table.method_paths("_STA")[0].clone();
        let patch = table.rename_patch(&sta, "XSTA").unwrap();
        assert_eq!(patch.comment, "_SB.EC0._STA to XSTA");
        assert!(patch.is_unique_in(table.raw()));
        let offset = table.patch_offset(&patch).unwrap();
        let row = table.next_hex_run(sta.line).unwrap();
        let row_addr = table.locate(row.start).unwrap();
        assert_eq!(offset + patch.pad.left.len(), row_addr + 2);
    }

    #[test]
    fn synthesizes_from_a_declaration_line() {
        let table = embedded_controller().table("DSDT");
        let sta = table.method_paths("_STA")[0];
        let row = table.next_hex_run(sta.line).unwrap().start;
        let from_decl = table
            .synthesize("_STA to XSTA", b"_STA", b"XSTA", sta.line, None, 0)
            .unwrap();
        let from_row = table
            .synthesize("_STA to XSTA", b"_STA", b"XSTA", row, None, 0)
            .unwrap();
        assert_eq!(from_decl, from_row);
        assert!(from_decl.is_unique_in(table.raw()));
    }

    #[test]
    fn rename_rejects_long_names() {
        let table = embedded_controller().table("DSDT");
        let sta = table.method_paths("_STA")[0].clone();
        assert_eq!(
            table.rename_patch(&sta, "XSTAX"),
            Err(PatchError::InvalidName("XSTAX".into()))
        );
    }

    #[test]
    fn restores_trailing_rows() {
        let (raw, mut lines) = embedded_controller().finish();
        // Drop the last hex row, as the disassembler does.
        let last = lines.iter().rposition(|l| hex::is_hex_row(l)).unwrap();
        lines.remove(last);
        let table = Table::from_listing("DSDT", raw, &lines.join("\n")).unwrap();
        let rebuilt = table.lines().last().unwrap();
        assert_eq!(hex::parse_hex_row(rebuilt).unwrap().bytes, vec![0xA4, 0x53, 0x54, 0x41, 0x53]);
    }

    #[test]
    fn locates_and_spans() {
        let table = embedded_controller().table("DSDT");
        let ec0 = table.device_paths("EC0")[0];
        let span = table.scope_span(ec0.line).unwrap();
        assert!(span.contains(table.method_paths("_STA")[0].line));
        assert!(!table.in_power_resource(ec0.line));
        assert_eq!(table.locate(3), Some(0x24));
    }

    #[test]
    fn rejects_short_images() {
        assert_eq!(
            Table::from_listing("X", vec![0; 8], ""),
            Err(SdtError::Truncated { len: 8 })
        );
    }
}
