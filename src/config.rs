/// Runtime settings and rule-file loading.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::filter::RuleSet;
use crate::wardrive::REPORT_HOTSPOTS;

pub const DEFAULT_ADAPTER: &str = "hci0";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// HCI interface name.
    pub adapter: String,
    /// Prefix privileged adapter commands with `sudo`.
    pub use_sudo: bool,
    pub logs_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Hotspots kept in session reports.
    pub top_n: usize,
    /// JSON rule file overriding the compiled-in tables.
    pub rules_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adapter: DEFAULT_ADAPTER.into(),
            use_sudo: true,
            logs_dir: "logs".into(),
            exports_dir: "exports".into(),
            data_dir: "data".into(),
            top_n: REPORT_HOTSPOTS,
            rules_file: None,
        }
    }
}

impl Settings {
    /// Create the output directories if missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.logs_dir, &self.exports_dir, &self.data_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// The rule tables to classify with.
    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        match &self.rules_file {
            Some(path) => load_rules(path),
            None => Ok(RuleSet::default()),
        }
    }
}

/// Read a JSON rule file. Keys absent from the file keep their defaults.
pub fn load_rules(path: &Path) -> Result<RuleSet, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::RuleFileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let rules: RuleSet = serde_json::from_str(&text).map_err(|source| ConfigError::RuleFileParse {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "Loaded rules from {}: {} signatures, {} service UUIDs",
        path.display(),
        rules.name_signatures.len(),
        rules.service_uuids.len()
    );
    Ok(rules)
}
