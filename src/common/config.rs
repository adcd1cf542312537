//! Engine configuration.
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration. Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Compression method for an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    Deflated,
}

/// Tunables for loading, cleaning and saving packages.
///
/// ```
/// use pptx_engine::common::config::EngineConfig;
///
/// let config = EngineConfig::from_yaml_str("indent_width: 4\n").unwrap();
/// assert_eq!(config.indent_width, 4);
/// assert!(config.is_reclaimable("ppt/slides/slide3.xml"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Spaces per nesting level in the working tree.
    pub indent_width: usize,
    /// Pretty-print XML parts on load. When false, parts keep their on-disk layout.
    pub format_xml: bool,
    /// Method for parts that had no entry in the source archive.
    pub default_compression: Compression,
    /// Deflate level for new parts (`None` lets the codec choose).
    pub default_compression_level: Option<i64>,
    /// Largest inflated size accepted for a single entry.
    pub max_part_bytes: u64,
    /// Largest inflated size accepted for the whole archive.
    pub max_total_bytes: u64,
    /// Directories whose parts may be deleted when unreachable.
    pub reclaimable_dirs: Vec<String>,
    /// Directories whose contents are always deleted by cleanup.
    pub discard_dirs: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            indent_width: 2,
            format_xml: true,
            default_compression: Compression::Deflated,
            default_compression_level: None,
            max_part_bytes: 256 * 1024 * 1024,
            max_total_bytes: 2 * 1024 * 1024 * 1024,
            reclaimable_dirs: [
                "ppt/slides",
                "ppt/notesSlides",
                "ppt/comments",
                "ppt/media",
                "ppt/embeddings",
                "ppt/charts",
                "ppt/diagrams",
                "ppt/tags",
                "ppt/drawings",
                "ppt/ink",
                "ppt/theme",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            discard_dirs: vec!["[trash]".to_string()],
        }
    }
}

impl EngineConfig {
    /// Parse a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Read a YAML configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_saphyr::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn check(&self) -> Result<(), ConfigError> {
        if let Some(level) = self.default_compression_level
            && !(0..=9).contains(&level)
        {
            return Err(ConfigError::Invalid(format!(
                "default_compression_level must be within 0..=9, got {level}"
            )));
        }
        if self.max_part_bytes == 0 || self.max_total_bytes < self.max_part_bytes {
            return Err(ConfigError::Invalid(
                "max_total_bytes must be at least max_part_bytes, and both non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether cleanup may delete `member` when nothing references it.
    pub fn is_reclaimable(&self, member: &str) -> bool {
        in_any_dir(member, &self.reclaimable_dirs)
    }

    /// Whether `member` lives in a directory that cleanup empties unconditionally.
    pub fn is_discarded(&self, member: &str) -> bool {
        in_any_dir(member, &self.discard_dirs)
    }
}

fn in_any_dir(member: &str, dirs: &[String]) -> bool {
    dirs.iter().any(|dir| {
        let dir = dir.trim_matches('/');
        member.len() > dir.len()
            && member.as_bytes()[dir.len()] == b'/'
            && member[..dir.len()].eq_ignore_ascii_case(dir)
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_overrides_and_dir_matching() {
        let yaml = "reclaimable_dirs: [ppt/slides]\ndiscard_dirs: ['[trash]', scratch/]\ndefault_compression: stored\n";
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.default_compression, Compression::Stored);
        assert!(config.is_reclaimable("ppt/slides/slide1.xml"));
        assert!(config.is_reclaimable("ppt/slides/_rels/slide1.xml.rels"));
        assert!(!config.is_reclaimable("ppt/slidesExtra/slide1.xml"));
        assert!(!config.is_reclaimable("ppt/media/image1.png"));
        assert!(config.is_discarded("[trash]/0001.dat"));
        assert!(config.is_discarded("scratch/a.xml"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EngineConfig::from_yaml_str("default_compression_level: 12\n").is_err());
        assert!(EngineConfig::from_yaml_str("max_part_bytes: 0\n").is_err());
        assert!(EngineConfig::from_yaml_str("no_such_key: 1\n").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = EngineConfig {
            indent_width: 4,
            ..EngineConfig::default()
        };
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(EngineConfig::from_yaml_str(&yaml).unwrap(), config);
    }
}
