//! Extractor configuration.
//!
//! Values come from an optional JSON file and are then overridden by the
//! command line (which also reads `SQLMETA_*` environment variables).

use crate::model::SchemaVersion;
use crate::namespace::SchemaRegistry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// How files under the root are picked up and which pipeline reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FamilyMode {
    /// `.rdl` in category layout and `.dtsx` anywhere, by extension.
    #[default]
    Auto,
    /// Report definitions only, one level of category directories.
    Rdl,
    /// SSIS packages only, walked recursively.
    Ssis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub family: FamilyMode,
    pub delimiter: char,
    /// Query column preview length for table display; unset keeps full text.
    pub preview_len: Option<usize>,
    pub include_report_key: bool,
    pub jobs: usize,
    /// Extra report-definition namespace URIs, mapped onto a known version.
    pub namespace_aliases: BTreeMap<String, SchemaVersion>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            family: FamilyMode::Auto,
            delimiter: '|',
            preview_len: None,
            include_report_key: false,
            jobs: 1,
            namespace_aliases: BTreeMap::new(),
        }
    }
}

impl ExtractorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// The delimiter as a single byte, as the table writer needs it.
    pub fn delimiter_byte(&self) -> Result<u8> {
        let d = self.delimiter;
        if !d.is_ascii() || d == '"' || d == '\n' || d == '\r' {
            anyhow::bail!("Delimiter must be a single ASCII character other than a quote or line break, got {:?}", d);
        }
        Ok(d as u8)
    }

    /// Worker count, at least one.
    pub fn worker_count(&self) -> usize {
        self.jobs.max(1)
    }

    pub fn registry(&self) -> Result<SchemaRegistry> {
        SchemaRegistry::default()
            .with_aliases(&self.namespace_aliases)
            .context("Invalid namespace_aliases")
    }
}
