//! Text formats for qconf documents

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported qconf serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// JSON, the format other tools exchange qconf files in
    #[default]
    Json,

    /// YAML, handy for hand-tuning
    Yaml,
}

impl ConfigFormat {
    pub fn extension(&self) -> &str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Yaml => "yaml",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }

    /// Detect from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|s| s.to_str())
            .and_then(Self::from_extension)
    }
}

/// Configuration for saving qconf documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveConfig {
    pub format: ConfigFormat,

    /// Pretty-print (JSON only; YAML is always block style)
    pub pretty: bool,
}

impl SaveConfig {
    pub fn new(format: ConfigFormat) -> Self {
        Self {
            format,
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self::new(ConfigFormat::Json)
    }
}
