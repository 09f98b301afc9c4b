//! Errors from loading a batch of tables.

use std::fmt;
use std::io;
use std::path::PathBuf;

use aslpatch_acpi::RepairError;

/// Why a load batch was aborted.
///
/// Every variant leaves the previously loaded table set untouched.
#[derive(Debug)]
pub enum LoadError {
    /// The input path is missing, unreadable, or holds no usable table.
    LoadFailure {
        /// The offending path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// More than one candidate carries a signature that must be unique.
    AmbiguousTable {
        /// The duplicated signature.
        signature: String,
        /// Every conflicting file, in natural order.
        names: Vec<String>,
    },
    /// The disassembler produced no output for any table in the batch.
    DisassemblyFailure {
        /// Tables that failed, in natural order.
        names: Vec<String>,
    },
    /// The DSDT failed to disassemble and no pre-patch fixed it.
    RepairExhausted {
        /// Name of the DSDT file.
        name: String,
        /// What the repair attempt ran into.
        source: RepairError,
    },
    /// The disassembler could not be started at all.
    Spawn {
        /// Program that was run.
        program: String,
        /// Underlying OS error.
        source: io::Error,
    },
    /// Reading or staging a table failed.
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadFailure { path, reason } => write!(f, "{}: {reason}", path.display()),
            Self::AmbiguousTable { signature, names } => write!(
                f,
                "multiple files carry the {signature} signature ({}); only one is allowed at a time",
                names.join(", ")
            ),
            Self::DisassemblyFailure { names } => {
                write!(f, "failed to disassemble {}", names.join(", "))
            }
            Self::RepairExhausted { name, source } => {
                write!(f, "{name} could not be disassembled: {source}")
            }
            Self::Spawn { program, .. } => write!(f, "failed to run {program}"),
            Self::Io { path, .. } => write!(f, "failed to access {}", path.display()),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RepairExhausted { source, .. } => Some(source),
            Self::Spawn { source, .. } | Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Attach the path being accessed to an I/O error.
pub trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T, LoadError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T, LoadError> {
        self.map_err(|source| LoadError::Io {
            path: path.into(),
            source,
        })
    }
}
