//! Harness configuration
//!
//! Loaded from an optional YAML file, then overridden by CLI flags.
//! Every field has a default, so an empty file is a valid config.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::checks::{default_layout, CheckKind};
use crate::reference::ZeroDegreePolicy;
use crate::tensors::Layout;
use crate::validation::Tolerance;
use crate::{DEFAULT_DATASET, DEFAULT_DATA_SUBDIR, HOME_ENV};

/// Dropout reference settings
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DropoutConfig {
    /// Probability of zeroing an element
    pub probability: f32,
    /// Seed for the reference mask
    pub seed: u64,
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self {
            probability: 0.2,
            seed: 0,
        }
    }
}

/// Full harness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory holding one sub-directory per dataset
    ///
    /// Defaults to `$HOME/gpu_memory_reduction/alzheimer/data`.
    pub data_dir: Option<PathBuf>,
    /// Dataset sub-directory (e.g. "flickr")
    pub dataset: String,
    /// Checks to run, in order
    pub checks: Vec<CheckKind>,
    /// Tolerance for approximate checks
    pub tolerance: Tolerance,
    /// Dropout reference settings
    pub dropout: DropoutConfig,
    /// Handling of zero-degree nodes in mean aggregation
    pub zero_degree: ZeroDegreePolicy,
    /// Rows/columns shown in matrix previews
    pub preview: usize,
    /// Run checks on separate threads
    pub parallel: bool,
    /// Per-file layout overrides, keyed by file name
    pub layouts: HashMap<String, Layout>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            dataset: DEFAULT_DATASET.to_string(),
            checks: Vec::new(),
            tolerance: Tolerance::default(),
            dropout: DropoutConfig::default(),
            zero_degree: ZeroDegreePolicy::default(),
            preview: 10,
            parallel: false,
            layouts: HashMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no check can run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.dropout.probability) {
            anyhow::bail!(
                "dropout.probability must be in [0, 1), got {}",
                self.dropout.probability
            );
        }
        if self.tolerance.atol < 0.0 || self.tolerance.rtol < 0.0 {
            anyhow::bail!("Tolerances must be non-negative");
        }
        if self.dataset.is_empty() {
            anyhow::bail!("dataset must not be empty");
        }
        Ok(())
    }

    /// Directory holding the dataset's files
    pub fn dataset_dir(&self) -> Result<PathBuf> {
        let home = std::env::var_os(HOME_ENV).map(PathBuf::from);
        self.dataset_dir_with_home(home.as_deref())
    }

    /// Resolve the dataset directory against an explicit home directory
    pub fn dataset_dir_with_home(&self, home: Option<&Path>) -> Result<PathBuf> {
        let base = match (&self.data_dir, home) {
            (Some(dir), _) => dir.clone(),
            (None, Some(home)) => home.join(DEFAULT_DATA_SUBDIR),
            (None, None) => anyhow::bail!(
                "No data directory configured and ${} is not set",
                HOME_ENV
            ),
        };
        Ok(base.join(&self.dataset))
    }

    /// Layout of an artifact file, honouring overrides
    pub fn layout_for(&self, file: &str) -> Layout {
        self.layouts
            .get(file)
            .copied()
            .unwrap_or_else(|| default_layout(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.dataset, "flickr");
        assert_eq!(config.dropout.probability, 0.2);
        assert_eq!(config.zero_degree, ZeroDegreePolicy::Skip);
        assert!(config.checks.is_empty());
    }

    #[test]
    fn test_empty_yaml() {
        let config = HarnessConfig::from_yaml("").unwrap();
        assert_eq!(config.preview, 10);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
data_dir: /data/alzheimer
dataset: reddit
checks: [graph_conv_mean, log_softmax]
tolerance:
    rtol: 1.0e-4
dropout:
    seed: 42
zero_degree: zero_fill
parallel: true
layouts:
    relu_result.npy: column_major
"#;
        let config = HarnessConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.checks, vec![CheckKind::GraphConvMean, CheckKind::LogSoftmax]);
        assert_eq!(config.tolerance.rtol, 1e-4);
        assert_eq!(config.tolerance.atol, 1e-8);
        assert_eq!(config.dropout.seed, 42);
        assert_eq!(config.dropout.probability, 0.2);
        assert_eq!(config.zero_degree, ZeroDegreePolicy::ZeroFill);
        assert!(config.parallel);
        assert_eq!(config.layout_for("relu_result.npy"), Layout::ColumnMajor);
        assert_eq!(
            config.dataset_dir_with_home(None).unwrap(),
            PathBuf::from("/data/alzheimer/reddit")
        );
    }

    #[test]
    fn test_unknown_check_rejected() {
        assert!(HarnessConfig::from_yaml("checks: [softmax]").is_err());
    }

    #[test]
    fn test_bad_dropout_probability() {
        assert!(HarnessConfig::from_yaml("dropout: {probability: 1.5}").is_err());
    }

    #[test]
    fn test_dataset_dir_from_home() {
        let config = HarnessConfig::default();
        let dir = config.dataset_dir_with_home(Some(Path::new("/home/ubuntu"))).unwrap();
        assert_eq!(
            dir,
            PathBuf::from("/home/ubuntu/gpu_memory_reduction/alzheimer/data/flickr")
        );
        assert!(config.dataset_dir_with_home(None).is_err());
    }

    #[test]
    fn test_default_layouts() {
        let config = HarnessConfig::default();
        assert_eq!(config.layout_for("graph_conv_result.npy"), Layout::ColumnMajor);
        assert_eq!(config.layout_for("log_softmax_out.npy"), Layout::ColumnMajor);
        assert_eq!(config.layout_for("relu_result.npy"), Layout::RowMajor);
        assert_eq!(config.layout_for("linear_result.npy"), Layout::RowMajor);
    }
}
