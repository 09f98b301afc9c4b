//! Configuration loading from `aslpatch.toml`.
//!
//! ```toml
//! iasl = "/usr/local/bin/iasl"
//! allowed-signatures = ["APIC", "DMAR", "DSDT", "SSDT"]
//! mixed-listing = ["DSDT", "SSDT"]
//!
//! [[pre-patch]]
//! label = "EC0 duplicate _REG methods"
//! comment = "EC0._REG to XREG"
//! find = "5F524547"
//! replace = "58524547"
//! ```
//!
//! Every key is optional. Pre-patches listed here are tried after the
//! built-in vendor fixes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use aslpatch_acpi::hex::decode_hex;
use aslpatch_acpi::{KNOWN_FIXES, PrePatch};
use serde::Deserialize;

use crate::store::StoreOptions;

/// File name searched for when no `--config` is given.
pub const CONFIG_FILE: &str = "aslpatch.toml";

const DEFAULT_ALLOWED: [&str; 4] = ["APIC", "DMAR", "DSDT", "SSDT"];
const DEFAULT_MIXED: [&str; 2] = ["DSDT", "SSDT"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    iasl: Option<PathBuf>,
    allowed_signatures: Option<Vec<String>>,
    mixed_listing: Option<Vec<String>>,
    #[serde(default)]
    pre_patch: Vec<PrePatchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrePatchEntry {
    label: String,
    comment: Option<String>,
    find: String,
    replace: String,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Disassembler binary.
    pub iasl: PathBuf,
    /// Signatures a file must carry to be considered a table.
    pub allowed_signatures: Vec<[u8; 4]>,
    /// Signatures disassembled as mixed listings.
    pub mixed_listing: Vec<[u8; 4]>,
    /// Built-in fixes followed by configured ones.
    pub pre_patches: Vec<PrePatch>,
    /// Where the configuration came from, if a file was used.
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iasl: PathBuf::from("iasl"),
            allowed_signatures: DEFAULT_ALLOWED.iter().map(|s| to_signature(s)).collect(),
            mixed_listing: DEFAULT_MIXED.iter().map(|s| to_signature(s)).collect(),
            pre_patches: KNOWN_FIXES.to_vec(),
            source: None,
        }
    }
}

fn to_signature(s: &str) -> [u8; 4] {
    let mut sig = [b' '; 4];
    for (dst, src) in sig.iter_mut().zip(s.bytes()) {
        *dst = src;
    }
    sig
}

fn parse_signature(s: &str) -> Result<[u8; 4]> {
    if s.len() != 4 || !s.is_ascii() {
        bail!("table signature '{s}' must be exactly 4 ASCII characters");
    }
    Ok(to_signature(s))
}

impl Config {
    /// Load from `explicit`, or from the nearest `aslpatch.toml` above the
    /// current directory, or fall back to defaults. `iasl` overrides the
    /// configured disassembler.
    pub fn load(explicit: Option<&Path>, iasl: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file()?,
        };
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let mut config = Self::from_toml(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                config.source = Some(path);
                config
            }
            None => Self::default(),
        };
        if let Some(iasl) = iasl {
            config.iasl = iasl.to_path_buf();
        }
        Ok(config)
    }

    /// Parse configuration text. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut config = Self::default();

        if let Some(iasl) = file.iasl {
            config.iasl = iasl;
        }
        if let Some(sigs) = file.allowed_signatures {
            config.allowed_signatures = sigs
                .iter()
                .map(|s| parse_signature(s))
                .collect::<Result<_>>()
                .context("invalid allowed-signatures")?;
        }
        if let Some(sigs) = file.mixed_listing {
            config.mixed_listing = sigs
                .iter()
                .map(|s| parse_signature(s))
                .collect::<Result<_>>()
                .context("invalid mixed-listing")?;
        }
        for entry in file.pre_patch {
            let find = decode_hex(&entry.find)
                .with_context(|| format!("pre-patch '{}': invalid find", entry.label))?;
            let replace = decode_hex(&entry.replace)
                .with_context(|| format!("pre-patch '{}': invalid replace", entry.label))?;
            if find.is_empty() || find.len() != replace.len() {
                bail!(
                    "pre-patch '{}': find and replace must be non-empty and the same length",
                    entry.label
                );
            }
            let comment = entry.comment.unwrap_or_else(|| entry.label.clone());
            config
                .pre_patches
                .push(PrePatch::new(entry.label, comment, find, replace));
        }
        Ok(config)
    }

    /// The subset of settings the table store needs.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            allowed_signatures: self.allowed_signatures.clone(),
            mixed_listing: self.mixed_listing.clone(),
            pre_patches: self.pre_patches.clone(),
        }
    }
}

/// Walk up from the current directory looking for [`CONFIG_FILE`].
fn find_config_file() -> Result<Option<PathBuf>> {
    let mut dir = std::env::current_dir().context("failed to get current directory")?;
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
        if !dir.pop() {
            return Ok(None);
        }
    }
}
