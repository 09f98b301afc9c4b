//! `aslpatch-acpi` --- a `no_std` model of disassembled ACPI tables.
//!
//! Works on two views of the same DSDT/SSDT side by side: the raw AML
//! image and the mixed listing the disassembler produces from it, where
//! ASL source lines are interleaved with address-labelled hex rows. From
//! those it builds:
//!
//! - a sorted index of fully qualified object paths ([`path`]),
//! - brace-delimited spans for bounding searches ([`scope`]),
//! - line-to-offset mapping over hex rows ([`hex`]),
//! - find/replace patches whose find bytes are unique in the table
//!   ([`patch`]),
//! - byte-level fixes for known firmware bugs that stop the disassembler
//!   from loading a table ([`prepatch`]).
//!
//! Nothing here touches the filesystem or runs the disassembler; the host
//! tool feeds in bytes and listing text.
//!
//! # Usage
//!
//! ```ignore
//! let table = Table::from_listing("DSDT", raw, &listing)?;
//! for sta in table.method_paths("_STA") {
//!     let patch = table.rename_patch(sta, "XSTA")?;
//!     // ...
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod hex;
pub mod listing;
pub mod patch;
pub mod path;
pub mod prepatch;
pub mod scope;
pub mod sdt;
pub mod table;

pub use hex::{HexError, HexRun};
pub use patch::{Direction, Pad, Patch, PatchError};
pub use path::{Declaration, NameSeg, ObjectKind, PathEntry};
pub use prepatch::{KNOWN_FIXES, PrePatch, RepairError, Repaired};
pub use scope::ScopeSpan;
pub use sdt::{SdtError, SdtHeader};
pub use table::Table;
