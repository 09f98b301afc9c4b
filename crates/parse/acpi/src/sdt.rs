//! System Description Table (SDT) header and checksum utilities.

use alloc::string::String;
use core::fmt;

/// Errors produced while reading an SDT header from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdtError {
    /// The buffer is shorter than [`SdtHeader::SIZE`] bytes.
    Truncated {
        /// Number of bytes that were available.
        len: usize,
    },
}

impl fmt::Display for SdtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len } => write!(
                f,
                "table is {len} bytes, shorter than the {}-byte SDT header",
                SdtHeader::SIZE
            ),
        }
    }
}

impl core::error::Error for SdtError {}

/// Standard ACPI System Description Table header.
///
/// This 36-byte header is present at the start of every ACPI table
/// (DSDT, SSDT, APIC, DMAR, etc.). All multi-byte fields are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdtHeader {
    /// 4-byte ASCII signature identifying the table type.
    pub signature: [u8; 4],
    /// Total length of the table, including the header, in bytes.
    pub length: u32,
    /// Revision of the table structure.
    pub revision: u8,
    /// Checksum byte. The entire table, including the header, must sum to zero.
    pub checksum: u8,
    /// OEM-supplied identification string.
    pub oem_id: [u8; 6],
    /// OEM-supplied table identification string.
    pub oem_table_id: [u8; 8],
    /// OEM-supplied revision number.
    pub oem_revision: u32,
    /// Vendor ID of the utility that created the table.
    pub creator_id: u32,
    /// Revision of the utility that created the table.
    pub creator_revision: u32,
}

impl SdtHeader {
    /// The size of an SDT header in bytes.
    pub const SIZE: usize = 36;

    /// Read an [`SdtHeader`] from the start of a table image.
    ///
    /// # Errors
    ///
    /// Returns [`SdtError::Truncated`] if `data` is shorter than
    /// [`SdtHeader::SIZE`] bytes.
    pub fn parse(data: &[u8]) -> Result<Self, SdtError> {
        if data.len() < Self::SIZE {
            return Err(SdtError::Truncated { len: data.len() });
        }

        let u32_at = |off: usize| {
            u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
        };

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[0..4]);
        let mut oem_id = [0u8; 6];
        oem_id.copy_from_slice(&data[10..16]);
        let mut oem_table_id = [0u8; 8];
        oem_table_id.copy_from_slice(&data[16..24]);

        Ok(Self {
            signature,
            length: u32_at(4),
            revision: data[8],
            checksum: data[9],
            oem_id,
            oem_table_id,
            oem_revision: u32_at(24),
            creator_id: u32_at(28),
            creator_revision: u32_at(32),
        })
    }

    /// Returns the 4-byte signature.
    #[must_use]
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }

    /// Returns the total length recorded in the header.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Returns `true` if the signature is one of `signatures`.
    #[must_use]
    pub fn is_one_of(&self, signatures: &[[u8; 4]]) -> bool {
        signatures.contains(&self.signature)
    }
}

/// Reads the 4-byte signature at the start of a table image, if present.
#[must_use]
pub fn signature_of(data: &[u8]) -> Option<[u8; 4]> {
    let mut sig = [0u8; 4];
    sig.copy_from_slice(data.get(..4)?);
    Some(sig)
}

/// Validate the checksum of a byte slice.
///
/// ACPI tables are designed so that the sum of all bytes in the table equals
/// zero (mod 256).
#[must_use]
pub fn validate_checksum(data: &[u8]) -> bool {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)) == 0
}

/// Render header bytes for display, replacing anything outside printable
/// ASCII with `?`.
///
/// Returns the rendered string and whether any byte had to be replaced.
#[must_use]
pub fn printable(bytes: &[u8]) -> (String, bool) {
    let mut lossy = false;
    let text = bytes
        .iter()
        .map(|&b| {
            if (b' '..b'~').contains(&b) {
                b as char
            } else {
                lossy = true;
                '?'
            }
        })
        .collect();
    (text, lossy)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a 36-byte header for `signature` followed by `body`, with a
    /// correct length and checksum.
    pub(crate) fn make_table(signature: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; SdtHeader::SIZE];
        buf[0..4].copy_from_slice(signature);
        buf[8] = 2;
        buf[10..16].copy_from_slice(b"ALASKA");
        buf[16..24].copy_from_slice(b"A M I\0\0\0");
        buf[24..28].copy_from_slice(&0x0107_2009u32.to_le_bytes());
        buf[28..32].copy_from_slice(b"INTL");
        buf[32..36].copy_from_slice(&0x2020_0925u32.to_le_bytes());
        buf.extend_from_slice(body);
        let len = buf.len() as u32;
        buf[4..8].copy_from_slice(&len.to_le_bytes());
        let sum = buf.iter().fold(0u8, |s, &b| s.wrapping_add(b));
        buf[9] = 0u8.wrapping_sub(sum);
        buf
    }

    #[test]
    fn parses_header_fields() {
        let raw = make_table(b"DSDT", &[0xA0, 0x0B]);
        let header = SdtHeader::parse(&raw).unwrap();
        assert_eq!(&header.signature, b"DSDT");
        assert_eq!(header.length as usize, raw.len());
        assert_eq!(header.revision, 2);
        assert_eq!(&header.oem_id, b"ALASKA");
        assert_eq!(&header.oem_table_id, b"A M I\0\0\0");
        assert_eq!(header.oem_revision, 0x0107_2009);
        assert_eq!(header.creator_revision, 0x2020_0925);
        assert!(validate_checksum(&raw));
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert_eq!(
            SdtHeader::parse(&[0u8; 20]),
            Err(SdtError::Truncated { len: 20 })
        );
    }

    #[test]
    fn corrupted_checksum_fails_validation() {
        let mut raw = make_table(b"SSDT", &[1, 2, 3]);
        raw[40] ^= 0xFF;
        assert!(!validate_checksum(&raw));
    }

    #[test]
    fn printable_marks_control_bytes() {
        assert_eq!(printable(b"A M I\0\0\0"), ("A M I???".into(), true));
        assert_eq!(printable(b"DSDT"), ("DSDT".into(), false));
    }

    #[test]
    fn signature_needs_four_bytes() {
        assert_eq!(signature_of(b"SSD"), None);
        assert_eq!(signature_of(b"SSDT\x01"), Some(*b"SSDT"));
    }
}
