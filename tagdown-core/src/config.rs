//! Configuration parsing and management.

use crate::parser::ParseOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Compiler configuration matching the `tagdown.yml` schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Syntax extension documents whose `#define:` directives are loaded
    /// before any other document, in order
    #[serde(default)]
    pub syntax: Vec<PathBuf>,

    #[serde(default = "default_true")]
    pub strip_bom: bool,

    #[serde(default = "default_true")]
    pub frontmatter: bool,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            syntax: Vec::new(),
            strip_bom: true,
            frontmatter: true,
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Parse configuration from YAML text; an empty text yields the defaults
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Syntax extension documents, resolved relative to the config file
    pub fn syntax_paths(&self) -> Vec<PathBuf> {
        self.syntax.iter().map(|p| self.resolve_path(p)).collect()
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strip_bom: self.strip_bom,
            frontmatter: self.frontmatter,
        }
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }

        if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                return parent.join(path);
            }
        }

        path.to_path_buf()
    }
}
