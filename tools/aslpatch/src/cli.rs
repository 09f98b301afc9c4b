//! Command-line interface definitions for aslpatch.

use std::path::PathBuf;

use aslpatch_acpi::{Direction, ObjectKind};
use clap::{Parser, Subcommand, ValueEnum};

/// Inspect ACPI tables and synthesize unique binary patches against them.
#[derive(Parser)]
#[command(name = "aslpatch", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Only print results and errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print every disassembler invocation and stage timings.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (default: nearest aslpatch.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disassembler binary, overriding the configuration.
    #[arg(long, global = true)]
    pub iasl: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// List loaded tables and their headers.
    Info(InfoArgs),
    /// Dump the fully qualified object paths of a table.
    Paths(PathsArgs),
    /// Synthesize patches renaming every matching object.
    Rename(RenameArgs),
    /// Synthesize a unique patch for raw bytes near a listing line.
    Patch(PatchArgs),
    /// Show which built-in fixes a failing DSDT needs.
    Repair(RepairArgs),
}

/// Arguments for the `info` subcommand.
#[derive(Parser)]
pub struct InfoArgs {
    /// Table file or directory of tables.
    pub path: PathBuf,
}

/// Arguments for the `paths` subcommand.
#[derive(Parser)]
pub struct PathsArgs {
    /// Table file or directory of tables.
    pub path: PathBuf,

    /// Table to inspect, by file name, signature, or table id (default: DSDT).
    #[arg(long, short = 't')]
    pub table: Option<String>,

    /// Only objects of this kind (device, method, name, processor, scope).
    #[arg(long, short = 'k')]
    pub kind: Option<ObjectKind>,

    /// Only paths ending with this suffix (e.g. `GFX0` or `PCI0.LPCB`).
    #[arg(long, short = 'f')]
    pub filter: Option<String>,
}

/// Arguments for the `rename` subcommand.
#[derive(Parser)]
pub struct RenameArgs {
    /// Table file or directory of tables.
    pub path: PathBuf,

    /// Path suffix of the object to rename (e.g. `_SB.PCI0.GFX0._STA`).
    #[arg(long, short = 'o')]
    pub object: String,

    /// New four-character name.
    #[arg(long)]
    pub to: String,

    /// Only rename objects of this kind.
    #[arg(long, short = 'k')]
    pub kind: Option<ObjectKind>,

    /// Table to search (default: every loaded table).
    #[arg(long, short = 't')]
    pub table: Option<String>,
}

/// Arguments for the `patch` subcommand.
#[derive(Parser)]
pub struct PatchArgs {
    /// Table file or directory of tables.
    pub path: PathBuf,

    /// Bytes to find, as hex.
    #[arg(long)]
    pub find: String,

    /// Replacement bytes, as hex (same length as --find).
    #[arg(long)]
    pub replace: String,

    /// Listing line where the search starts: a hex row, or a declaration
    /// line as printed by `paths` (its bytes are searched).
    #[arg(long, short = 'l')]
    pub line: usize,

    /// Which occurrence in the starting hex run to target.
    #[arg(long, short = 'i', default_value_t = 0)]
    pub instance: usize,

    /// How padding may grow around the pattern.
    #[arg(long, short = 'd', value_enum, default_value_t = Growth::Shortest)]
    pub direction: Growth,

    /// Table to patch (default: DSDT, or the only loaded table).
    #[arg(long, short = 't')]
    pub table: Option<String>,

    /// Comment for the patch record.
    #[arg(long, short = 'c')]
    pub comment: Option<String>,
}

/// Arguments for the `repair` subcommand.
#[derive(Parser)]
pub struct RepairArgs {
    /// Table file or directory of tables.
    pub path: PathBuf,
}

/// Padding growth strategy for `patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Growth {
    Both,
    Left,
    Right,
    /// Try every direction and keep the shortest result.
    Shortest,
}

impl Growth {
    /// The synthesizer direction, or `None` to search for the shortest.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Both => Some(Direction::Both),
            Self::Left => Some(Direction::Left),
            Self::Right => Some(Direction::Right),
            Self::Shortest => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_patch_arguments() {
        let cli = Cli::try_parse_from([
            "aslpatch", "patch", "tables", "--find", "5F535441", "--replace", "58535441",
            "--line", "42", "-d", "left", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Command::Patch(args) = cli.command else {
            panic!("expected patch");
        };
        assert_eq!(args.line, 42);
        assert_eq!(args.instance, 0);
        assert_eq!(args.direction.direction(), Some(Direction::Left));
    }

    #[test]
    fn parses_kinds_and_rejects_conflicts() {
        let cli =
            Cli::try_parse_from(["aslpatch", "paths", "DSDT.aml", "--kind", "Method", "-f", "_STA"])
                .unwrap();
        let Command::Paths(args) = cli.command else {
            panic!("expected paths");
        };
        assert_eq!(args.kind, Some(ObjectKind::Method));

        assert!(Cli::try_parse_from(["aslpatch", "-q", "-v", "info", "x"]).is_err());
        assert!(Cli::try_parse_from(["aslpatch", "paths", "x", "--kind", "Field"]).is_err());
    }
}
