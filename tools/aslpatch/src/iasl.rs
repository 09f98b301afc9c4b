//! The external disassembler boundary.
//!
//! [`Disassembler`] is the one seam between the table store and the outside
//! world; [`Iasl`] implements it by running ACPICA's `iasl`, and tests swap
//! in a fake that writes canned listings.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::{fmt, io};

use crate::verbose::vprintln;

/// How hard the disassembler should try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mixed listing with external-symbol resolution across the batch
    /// (`-da -dl -l`). Fastest, but trips over tables that were patched in
    /// place.
    Aggressive,
    /// Mixed listing without `-da` (`-dl -l`).
    Conservative,
    /// Plain disassembly for tables without AML (APIC, DMAR, ...).
    Plain,
}

impl Mode {
    /// Command-line flags for this mode.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            Self::Aggressive => &["-da", "-dl", "-l"],
            Self::Conservative => &["-dl", "-l"],
            Self::Plain => &[],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Aggressive => "aggressive",
            Self::Conservative => "conservative",
            Self::Plain => "plain",
        })
    }
}

/// Result of one disassembler run.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Captured stderr, verbatim.
    pub stderr: String,
}

/// Something that turns table files into `.dsl` listings.
pub trait Disassembler {
    /// Human-readable program name, for messages.
    fn program(&self) -> String;

    /// Disassemble `files` (names relative to `dir`), leaving a `.dsl`
    /// listing next to each input it could handle.
    ///
    /// Returns `Err` only when the process could not be started; a run that
    /// starts but fails is reported through [`Outcome::success`].
    fn disassemble(&self, dir: &Path, files: &[String], mode: Mode) -> io::Result<Outcome>;
}

/// Path of the listing the disassembler writes for `file`.
pub fn listing_path(dir: &Path, file: &str) -> PathBuf {
    dir.join(file).with_extension("dsl")
}

/// Returns `true` if the listing for `file` exists and is non-empty.
pub fn has_listing(dir: &Path, file: &str) -> bool {
    std::fs::metadata(listing_path(dir, file)).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// A typed builder for `iasl` invocations.
pub struct IaslCommand {
    cmd: Command,
    program: String,
}

impl IaslCommand {
    /// Start a command for the given `iasl` binary.
    pub fn new(binary: &Path) -> Self {
        Self {
            cmd: Command::new(binary),
            program: binary.display().to_string(),
        }
    }

    /// Run from `dir`, where the inputs live and outputs land.
    pub fn current_dir(&mut self, dir: &Path) -> &mut Self {
        self.cmd.current_dir(dir);
        self
    }

    /// Add the flags for `mode`.
    pub fn mode(&mut self, mode: Mode) -> &mut Self {
        self.cmd.args(mode.flags());
        self
    }

    /// Add one input file.
    pub fn file(&mut self, file: impl AsRef<OsStr>) -> &mut Self {
        self.cmd.arg(file);
        self
    }

    /// Execute and capture output.
    pub fn run(&mut self) -> io::Result<Output> {
        vprintln!("  $ {:?}", self.cmd);
        self.cmd.output()
    }
}

/// The real disassembler.
pub struct Iasl {
    binary: PathBuf,
}

impl Iasl {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Disassembler for Iasl {
    fn program(&self) -> String {
        self.binary.display().to_string()
    }

    fn disassemble(&self, dir: &Path, files: &[String], mode: Mode) -> io::Result<Outcome> {
        let mut cmd = IaslCommand::new(&self.binary);
        cmd.current_dir(dir).mode(mode);
        for file in files {
            cmd.file(file);
        }
        let output = cmd.run()?;
        Ok(Outcome {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags() {
        assert_eq!(Mode::Aggressive.flags(), ["-da", "-dl", "-l"]);
        assert_eq!(Mode::Conservative.flags(), ["-dl", "-l"]);
        assert!(Mode::Plain.flags().is_empty());
    }

    #[test]
    fn listing_names_replace_the_extension() {
        let dir = Path::new("/tmp/x");
        assert_eq!(listing_path(dir, "SSDT-1.aml"), dir.join("SSDT-1.dsl"));
        assert_eq!(listing_path(dir, "DSDT"), dir.join("DSDT.dsl"));
    }

    #[test]
    fn empty_listing_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_listing(dir.path(), "DSDT.aml"));
        std::fs::write(dir.path().join("DSDT.dsl"), "").unwrap();
        assert!(!has_listing(dir.path(), "DSDT.aml"));
        std::fs::write(dir.path().join("DSDT.dsl"), "{\n}").unwrap();
        assert!(has_listing(dir.path(), "DSDT.aml"));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let iasl = Iasl::new("/nonexistent/iasl-for-tests");
        let dir = tempfile::tempdir().unwrap();
        assert!(
            iasl.disassemble(dir.path(), &["DSDT.aml".into()], Mode::Plain)
                .is_err()
        );
    }
}
