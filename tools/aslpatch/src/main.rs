//! ACPI table inspection and patch synthesis.
//!
//! Disassembles DSDT/SSDT tables with `iasl` into mixed listings, indexes
//! every declared object by its fully qualified path, and synthesizes
//! find/replace patches that match exactly once in the binary table.
//!
//! Pipeline: collect tables → repair a failing DSDT → disassemble →
//!           index paths → locate hex → grow padding until unique.

mod cli;
mod config;
mod error;
mod iasl;
mod record;
mod sort;
mod store;
mod verbose;

use std::path::Path;

use anyhow::{Context, Result, bail};
use aslpatch_acpi::hex::{decode_hex, encode_hex};
use aslpatch_acpi::sdt::{printable, validate_checksum};
use aslpatch_acpi::{PathEntry, Table};
use clap::Parser;
use serde::Serialize;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::iasl::Iasl;
use crate::record::PatchRecord;
use crate::store::{LoadReport, TableStore};
use crate::verbose::{dprintln, vprintln};

fn main() -> Result<()> {
    let cli = Cli::parse();
    // JSON output owns stdout unless progress was asked for explicitly.
    verbose::init(cli.quiet || (cli.json && !cli.verbose), cli.verbose);

    let config = Config::load(cli.config.as_deref(), cli.iasl.as_deref())?;
    if let Some(source) = &config.source {
        vprintln!("Using configuration from {}", source.display());
    }

    match cli.command {
        Command::Info(ref args) => cmd_info(&cli, &config, &args.path),
        Command::Paths(ref args) => cmd_paths(&cli, &config, args),
        Command::Rename(ref args) => cmd_rename(&cli, &config, args),
        Command::Patch(ref args) => cmd_patch(&cli, &config, args),
        Command::Repair(ref args) => cmd_repair(&cli, &config, &args.path),
    }
}

// ===========================================================================
// Loading
// ===========================================================================

/// Load `path` into a fresh store, reporting partial failures.
fn load(config: &Config, path: &Path) -> Result<(TableStore<Iasl>, LoadReport)> {
    let mut store = TableStore::new(Iasl::new(&config.iasl), config.store_options());
    let report = store
        .load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    if !report.failed.is_empty() {
        eprintln!("warning: could not disassemble {}", report.failed.join(", "));
    }
    if let Some(reason) = &report.unrepaired {
        eprintln!("warning: the DSDT could not be repaired: {reason}");
    }
    if let Some(repair) = &report.repair {
        dprintln!(
            "{} needed {} pre-patch(es); add them to your config.",
            repair.table,
            repair.applied.len()
        );
    }
    dprintln!(
        "Loaded {} table(s) from {}.",
        report.loaded.len(),
        report.root.display()
    );
    Ok((store, report))
}

/// Resolve `--table`, defaulting to the DSDT or the only loaded table.
fn select_table<'a>(store: &'a TableStore<Iasl>, query: Option<&str>) -> Result<&'a Table> {
    let Some(query) = query else {
        return store
            .dsdt_or_only()
            .context("no DSDT loaded; choose a table with --table");
    };
    let matches = store.select(query);
    match matches.as_slice() {
        [one] => Ok(*one),
        [] => bail!("no loaded table matches '{query}'"),
        many => bail!(
            "'{query}' matches {} tables ({}); use a file name",
            many.len(),
            many.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn print_records(cli: &Cli, mut records: Vec<PatchRecord>) -> Result<()> {
    record::sort_records(&mut records);
    if cli.json {
        println!("{}", record::to_json(&records)?);
    } else {
        print!("{}", record::render(&records));
    }
    Ok(())
}

// ===========================================================================
// Commands
// ===========================================================================

#[derive(Serialize)]
struct TableInfo {
    name: String,
    signature: String,
    oem_id: String,
    table_id: String,
    revision: u8,
    oem_revision: u32,
    length: u32,
    checksum_valid: bool,
    mixed_listing: bool,
    objects: usize,
}

impl TableInfo {
    fn new(table: &Table) -> Self {
        let header = table.header();
        Self {
            name: table.name().to_string(),
            signature: printable(&header.signature).0,
            oem_id: printable(&header.oem_id).0,
            table_id: printable(&header.oem_table_id).0,
            revision: header.revision,
            oem_revision: header.oem_revision,
            length: header.length,
            checksum_valid: validate_checksum(table.raw()),
            mixed_listing: table.is_mixed(),
            objects: table.paths().len(),
        }
    }
}

/// List every loaded table with its header fields.
fn cmd_info(cli: &Cli, config: &Config, path: &Path) -> Result<()> {
    let (store, _) = load(config, path)?;
    let infos: Vec<TableInfo> = store.tables().iter().map(TableInfo::new).collect();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&infos).context("failed to serialize table info")?
        );
        return Ok(());
    }

    println!(
        "{:<20} {:<4}  {:<6}  {:<8}  {:>3}  {:>10}  {:>8}  {:>7}",
        "Name", "Sig", "OEM", "Table ID", "Rev", "OEM Rev", "Length", "Objects"
    );
    for info in &infos {
        println!(
            "{:<20} {:<4}  {:<6}  {:<8}  {:>3}  {:>#10x}  {:>8}  {:>7}{}",
            info.name,
            info.signature,
            info.oem_id,
            info.table_id,
            info.revision,
            info.oem_revision,
            info.length,
            info.objects,
            if info.checksum_valid { "" } else { "  (bad checksum)" }
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct PathRow<'a> {
    path: &'a str,
    kind: String,
    line: usize,
    offset: Option<usize>,
}

/// Dump the object paths of one table.
fn cmd_paths(cli: &Cli, config: &Config, args: &cli::PathsArgs) -> Result<()> {
    let (store, _) = load(config, &args.path)?;
    let table = select_table(&store, args.table.as_deref())?;
    let entries = table.paths_of(args.kind, args.filter.as_deref().unwrap_or(""));

    let rows: Vec<PathRow<'_>> = entries
        .iter()
        .map(|e| PathRow {
            path: &e.path,
            kind: e.kind.to_string(),
            line: e.line,
            offset: table.locate(e.line),
        })
        .collect();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("failed to serialize paths")?
        );
        return Ok(());
    }

    dprintln!("{} object(s) in {}:", rows.len(), table.name());
    for row in &rows {
        let offset = row.offset.map_or_else(|| "-".to_string(), |o| format!("{o:#06x}"));
        println!("{:>7}  {:>8}  {:<9}  {}", row.line, offset, row.kind, row.path);
    }
    Ok(())
}

/// Rename every object matching `--object` in the selected tables.
fn cmd_rename(cli: &Cli, config: &Config, args: &cli::RenameArgs) -> Result<()> {
    let (store, _) = load(config, &args.path)?;
    let tables: Vec<&Table> = match &args.table {
        Some(query) => vec![select_table(&store, Some(query))?],
        None => store.tables().iter().collect(),
    };

    let mut matched = 0;
    let mut records = Vec::new();
    for table in tables {
        for entry in table.paths_of(args.kind, &args.object) {
            matched += 1;
            if let Some(record) = rename(table, entry, &args.to)? {
                records.push(record);
            }
        }
    }

    if matched == 0 {
        bail!("no object matches '{}'", args.object);
    }
    if records.is_empty() {
        bail!("no unique rename patch found for '{}'", args.object);
    }
    print_records(cli, records)
}

/// Synthesize one rename. Recoverable failures are reported and skipped.
fn rename(table: &Table, entry: &PathEntry, to: &str) -> Result<Option<PatchRecord>> {
    match table.rename_patch(entry, to) {
        Ok(patch) => {
            vprintln!(
                "  {} in {}: {} byte(s) of padding",
                entry.path,
                table.name(),
                patch.pad.len()
            );
            Ok(Some(PatchRecord::from_patch(&patch, Some(table))))
        }
        Err(e) if e.is_recoverable() => {
            dprintln!("Skipping {} in {}: {e}", entry.path, table.name());
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("cannot rename {}", entry.path)),
    }
}

/// Synthesize a patch for raw bytes starting at a listing line.
fn cmd_patch(cli: &Cli, config: &Config, args: &cli::PatchArgs) -> Result<()> {
    let find = decode_hex(&args.find).context("invalid --find")?;
    let replace = decode_hex(&args.replace).context("invalid --replace")?;

    let (store, _) = load(config, &args.path)?;
    let table = select_table(&store, args.table.as_deref())?;
    if args.line >= table.lines().len() {
        bail!(
            "line {} is past the end of {} ({} lines)",
            args.line,
            table.name(),
            table.lines().len()
        );
    }

    let comment = args
        .comment
        .clone()
        .unwrap_or_else(|| format!("{} to {}", encode_hex(&find), encode_hex(&replace)));
    let patch = table
        .synthesize(
            comment,
            &find,
            &replace,
            args.line,
            args.direction.direction(),
            args.instance,
        )
        .with_context(|| format!("no unique patch from line {} of {}", args.line, table.name()))?;

    if let Some(offset) = table.patch_offset(&patch) {
        vprintln!("  matches once at {offset:#x} in {}", table.name());
    }
    print_records(cli, vec![PatchRecord::from_patch(&patch, Some(table))])
}

/// Load tables and report the pre-patches the DSDT needed, if any.
fn cmd_repair(cli: &Cli, config: &Config, path: &Path) -> Result<()> {
    let (_, report) = load(config, path)?;
    if let Some(reason) = report.unrepaired {
        bail!("no pre-patch made the DSDT disassemble: {reason}");
    }
    let Some(repair) = report.repair else {
        if cli.json {
            println!("[]");
        } else {
            println!("No pre-patches needed.");
        }
        return Ok(());
    };
    let records = repair
        .applied
        .iter()
        .map(|p| PatchRecord::from_patch(p, None))
        .collect();
    print_records(cli, records)
}
