//! Loading table files through the disassembler.
//!
//! A load batch goes through these stages:
//!
//! 1. collect candidates (a single file, or every table file in a
//!    directory, falling back to an `ACPI` subdirectory),
//! 2. refuse ambiguous batches (more than one DSDT),
//! 3. stage copies in a temporary directory,
//! 4. trial-disassemble the DSDT and, if that fails, run the pre-patch
//!    repair cycle on the staged copy (an unrepairable DSDT is reported
//!    as failed and the rest of the batch still loads),
//! 5. disassemble the batch (aggressive, then conservative, then each
//!    failure on its own),
//! 6. build a [`Table`] for every listing produced.
//!
//! The loaded set is only replaced once a batch succeeds; any error leaves
//! the previous set in place.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use aslpatch_acpi::prepatch::{self, PrePatch, RepairError};
use aslpatch_acpi::{Patch, SdtHeader, Table};
use walkdir::WalkDir;

use crate::error::{IoContext, LoadError};
use crate::iasl::{Disassembler, Mode, Outcome, has_listing, listing_path};
use crate::sort::{natural_cmp, sort_naturally};
use crate::verbose::{Timer, dprintln, echo_stderr, vprintln};

const DSDT: [u8; 4] = *b"DSDT";

/// Store settings taken from the configuration.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Signatures a file must carry to be loaded.
    pub allowed_signatures: Vec<[u8; 4]>,
    /// Signatures disassembled as mixed listings.
    pub mixed_listing: Vec<[u8; 4]>,
    /// Fixes tried, in order, on a DSDT that fails to disassemble.
    pub pre_patches: Vec<PrePatch>,
}

/// Pre-patches that had to be applied to get the DSDT loaded.
#[derive(Debug, Clone)]
pub struct RepairReport {
    /// The repaired table.
    pub table: String,
    /// Applied fixes, as patch records for the bootloader config.
    pub applied: Vec<Patch>,
}

/// Summary of a successful load batch.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Directory the tables were read from.
    pub root: PathBuf,
    /// Loaded tables, in natural order.
    pub loaded: Vec<String>,
    /// Tables that could not be disassembled, in natural order.
    pub failed: Vec<String>,
    /// Set when the DSDT needed pre-patches.
    pub repair: Option<RepairReport>,
    /// Why the DSDT could not be repaired; it is then listed in `failed`.
    pub unrepaired: Option<RepairError>,
}

struct Candidate {
    name: String,
    signature: [u8; 4],
    raw: Vec<u8>,
}

/// Loaded tables, kept in natural name order.
pub struct TableStore<D> {
    disassembler: D,
    options: StoreOptions,
    tables: Vec<Table>,
}

fn is_disassembled(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("dsl") || e.eq_ignore_ascii_case("asl"))
}

fn read_signature(path: &Path) -> io::Result<Option<[u8; 4]>> {
    let mut sig = [0u8; 4];
    match File::open(path)?.read_exact(&mut sig) {
        Ok(()) => Ok(Some(sig)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

fn display_signature(sig: &[u8; 4]) -> String {
    aslpatch_acpi::sdt::printable(sig).0
}

fn trim_id(id: &[u8]) -> &[u8] {
    let end = id
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map_or(0, |p| p + 1);
    &id[..end]
}

fn remove_listing(dir: &Path, file: &str) -> Result<(), LoadError> {
    let path = listing_path(dir, file);
    match fs::remove_file(&path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(LoadError::Io { path, source: e }),
        _ => Ok(()),
    }
}

impl<D: Disassembler> TableStore<D> {
    pub fn new(disassembler: D, options: StoreOptions) -> Self {
        Self {
            disassembler,
            options,
            tables: Vec::new(),
        }
    }

    /// Load a table file or a directory of tables, replacing the current
    /// set on success.
    pub fn load(&mut self, path: &Path) -> Result<LoadReport, LoadError> {
        let _timer = Timer::start("load");
        let (root, candidates) = self.collect(path)?;

        let dsdts: Vec<&Candidate> = candidates.iter().filter(|c| c.signature == DSDT).collect();
        if dsdts.len() > 1 {
            return Err(LoadError::AmbiguousTable {
                signature: display_signature(&DSDT),
                names: dsdts.iter().map(|c| c.name.clone()).collect(),
            });
        }

        let work = tempfile::tempdir().at(std::env::temp_dir())?;
        let dir = work.path();
        for c in &candidates {
            fs::write(dir.join(&c.name), &c.raw).at(dir.join(&c.name))?;
        }

        let mut repair = None;
        let mut unrepaired = None;
        if let Some(dsdt) = dsdts.first() {
            dprintln!("Disassembling {} to check whether pre-patches are needed...", dsdt.name);
            if self.disassemble_one(dir, &dsdt.name, Mode::Aggressive)? {
                vprintln!("  {} disassembled cleanly", dsdt.name);
            } else {
                match self.repair(dir, dsdt) {
                    Ok(report) => repair = Some(report),
                    Err(LoadError::RepairExhausted { name, source }) => unrepaired = Some((name, source)),
                    Err(e) => return Err(e),
                }
            }
        }

        let batch: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| unrepaired.as_ref().is_none_or(|(name, _)| *name != c.name))
            .collect();
        if batch.len() > 1 {
            dprintln!("Loading {} tables from {}...", batch.len(), root.display());
        }
        let mut failed = self.disassemble_batch(dir, &batch)?;
        if let Some((name, _)) = &unrepaired {
            failed.push(name.clone());
            sort_naturally(&mut failed);
        }

        let mut tables = Vec::new();
        for c in batch.iter().filter(|c| !failed.contains(&c.name)) {
            let raw = fs::read(dir.join(&c.name)).at(dir.join(&c.name))?;
            let listing_file = listing_path(dir, &c.name);
            let listing = fs::read(&listing_file).at(&listing_file)?;
            let table = Table::from_listing(&c.name, raw, &String::from_utf8_lossy(&listing))
                .map_err(|e| LoadError::LoadFailure {
                    path: root.join(&c.name),
                    reason: e.to_string(),
                })?;
            tables.push(table);
        }
        if tables.is_empty() {
            return Err(match unrepaired {
                Some((name, source)) => LoadError::RepairExhausted { name, source },
                None => LoadError::DisassemblyFailure { names: failed },
            });
        }

        self.tables = tables;
        Ok(LoadReport {
            root,
            loaded: self.tables.iter().map(|t| t.name().to_string()).collect(),
            failed,
            repair,
            unrepaired: unrepaired.map(|(_, source)| source),
        })
    }

    fn collect(&self, path: &Path) -> Result<(PathBuf, Vec<Candidate>), LoadError> {
        if path.is_dir() {
            return self.collect_dir(path);
        }
        if !path.is_file() {
            return Err(LoadError::LoadFailure {
                path: path.to_path_buf(),
                reason: "no such file or directory".into(),
            });
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains("Patched") {
            return Err(LoadError::LoadFailure {
                path: path.to_path_buf(),
                reason: "refusing to load an already patched table".into(),
            });
        }
        let raw = fs::read(path).at(path)?;
        let candidate = self.candidate(name, raw).map_err(|reason| LoadError::LoadFailure {
            path: path.to_path_buf(),
            reason,
        })?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok((root, vec![candidate]))
    }

    fn collect_dir(&self, dir: &Path) -> Result<(PathBuf, Vec<Candidate>), LoadError> {
        dprintln!("Gathering valid tables from {}...", dir.display());
        let mut candidates = Vec::new();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by(|a, b| natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy()));
        for entry in walker {
            let entry = entry.map_err(|e| LoadError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains("Patched") || is_disassembled(&name) {
                continue;
            }
            let Some(sig) = read_signature(entry.path()).at(entry.path())? else {
                continue;
            };
            if !self.options.allowed_signatures.contains(&sig) {
                continue;
            }
            let raw = fs::read(entry.path()).at(entry.path())?;
            match self.candidate(name, raw) {
                Ok(c) => {
                    dprintln!(" - {}", c.name);
                    candidates.push(c);
                }
                Err(reason) => vprintln!("  skipping {}: {reason}", entry.path().display()),
            }
        }

        if candidates.is_empty() {
            let nested = dir.join("ACPI");
            if nested.is_dir() {
                return self.collect_dir(&nested);
            }
            return Err(LoadError::LoadFailure {
                path: dir.to_path_buf(),
                reason: "no valid ACPI tables found".into(),
            });
        }
        Ok((dir.to_path_buf(), candidates))
    }

    fn candidate(&self, name: String, raw: Vec<u8>) -> Result<Candidate, String> {
        let header = SdtHeader::parse(&raw).map_err(|e| e.to_string())?;
        if !header.is_one_of(&self.options.allowed_signatures) {
            return Err(format!(
                "unsupported table signature '{}'",
                display_signature(&header.signature)
            ));
        }
        Ok(Candidate {
            name,
            signature: header.signature,
            raw,
        })
    }

    fn is_mixed(&self, signature: &[u8; 4]) -> bool {
        self.options.mixed_listing.contains(signature)
    }

    fn run(&self, dir: &Path, files: &[String], mode: Mode) -> Result<Outcome, LoadError> {
        vprintln!("  {} disassembly of {}", mode, files.join(", "));
        for file in files {
            remove_listing(dir, file)?;
        }
        let outcome = self
            .disassembler
            .disassemble(dir, files, mode)
            .map_err(|source| LoadError::Spawn {
                program: self.disassembler.program(),
                source,
            })?;
        if !outcome.success {
            echo_stderr(&self.disassembler.program(), &outcome.stderr);
        }
        Ok(outcome)
    }

    /// Disassemble one mixed-listing table, retrying conservatively.
    fn disassemble_one(&self, dir: &Path, file: &str, first: Mode) -> Result<bool, LoadError> {
        let files = [file.to_string()];
        let outcome = self.run(dir, &files, first)?;
        if outcome.success && has_listing(dir, file) {
            return Ok(true);
        }
        if first == Mode::Conservative {
            return Ok(false);
        }
        self.run(dir, &files, Mode::Conservative)?;
        Ok(has_listing(dir, file))
    }

    /// Returns the names of the tables that produced no listing.
    fn disassemble_batch(&self, dir: &Path, candidates: &[&Candidate]) -> Result<Vec<String>, LoadError> {
        let _timer = Timer::start("disassembly");
        let (mixed, other): (Vec<&Candidate>, Vec<&Candidate>) =
            candidates.iter().copied().partition(|c| self.is_mixed(&c.signature));
        let mixed: Vec<String> = mixed.into_iter().map(|c| c.name.clone()).collect();
        let other: Vec<String> = other.into_iter().map(|c| c.name.clone()).collect();
        let mut failed = Vec::new();

        if !mixed.is_empty() {
            let outcome = self.run(dir, &mixed, Mode::Aggressive)?;
            if !outcome.success {
                self.run(dir, &mixed, Mode::Conservative)?;
            }
            for name in mixed.iter().filter(|n| !has_listing(dir, n)) {
                dprintln!("Retrying {name} on its own...");
                if !self.disassemble_one(dir, name, Mode::Conservative)? {
                    failed.push(name.clone());
                }
            }
        }
        if !other.is_empty() {
            self.run(dir, &other, Mode::Plain)?;
            failed.extend(other.iter().filter(|n| !has_listing(dir, n)).cloned());
        }

        sort_naturally(&mut failed);
        Ok(failed)
    }

    /// Run the pre-patch cycle on the staged copy of a failing DSDT.
    ///
    /// On success the staged file holds the repaired bytes.
    fn repair(&self, dir: &Path, dsdt: &Candidate) -> Result<RepairReport, LoadError> {
        dprintln!("Checking available pre-patches...");
        let staged = dir.join(&dsdt.name);
        let mut check_error = None;
        let result = prepatch::repair(&dsdt.raw, &self.options.pre_patches, |fix, bytes| {
            dprintln!(" - {}", fix.label);
            dprintln!(" --> found, applying...");
            if let Err(source) = fs::write(&staged, bytes) {
                check_error = Some(LoadError::Io {
                    path: staged.clone(),
                    source,
                });
                return true;
            }
            match self.disassemble_one(dir, &dsdt.name, Mode::Aggressive) {
                Ok(loaded) => loaded,
                Err(e) => {
                    check_error = Some(e);
                    true
                }
            }
        });
        if let Some(e) = check_error {
            return Err(e);
        }
        match result {
            Ok(repaired) => {
                dprintln!("Disassembly succeeded after {} pre-patch(es).", repaired.applied.len());
                Ok(RepairReport {
                    table: dsdt.name.clone(),
                    applied: repaired.applied,
                })
            }
            Err(source) => Err(LoadError::RepairExhausted {
                name: dsdt.name.clone(),
                source,
            }),
        }
    }

    /// Every loaded table, in natural order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Table by file name, or by file stem ignoring case.
    pub fn by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name).or_else(|| {
            self.tables.iter().find(|t| {
                Path::new(t.name())
                    .file_stem()
                    .is_some_and(|s| s.to_string_lossy().eq_ignore_ascii_case(name))
            })
        })
    }

    /// Tables carrying `signature`.
    pub fn by_signature(&self, signature: &[u8]) -> Vec<&Table> {
        self.tables
            .iter()
            .filter(|t| t.signature().as_slice() == signature)
            .collect()
    }

    /// Tables whose OEM table id matches `id`, ignoring trailing NUL and
    /// space padding.
    pub fn by_table_id(&self, id: &[u8]) -> Vec<&Table> {
        let id = trim_id(id);
        self.tables
            .iter()
            .filter(|t| trim_id(&t.table_id()) == id)
            .collect()
    }

    /// Tables matching `text` as a signature or as a table id.
    pub fn by_signature_or_id(&self, text: &str) -> Vec<&Table> {
        let by_sig = self.by_signature(text.as_bytes());
        if by_sig.is_empty() {
            self.by_table_id(text.as_bytes())
        } else {
            by_sig
        }
    }

    /// Resolve a user-supplied table selector: a file name or stem first,
    /// then a signature or table id.
    pub fn select(&self, query: &str) -> Vec<&Table> {
        match self.by_name(query) {
            Some(table) => vec![table],
            None => self.by_signature_or_id(query),
        }
    }

    /// The DSDT, if one is loaded.
    pub fn dsdt(&self) -> Option<&Table> {
        self.tables.iter().find(|t| t.signature() == DSDT)
    }

    /// The DSDT, or the only table when exactly one is loaded.
    pub fn dsdt_or_only(&self) -> Option<&Table> {
        match self.tables.as_slice() {
            [only] => Some(only),
            _ => self.dsdt(),
        }
    }
}
