//! Check runner
//!
//! Loads the shared inputs once, then runs the configured checks either
//! one after another or on the rayon pool.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::artifacts::*;
use super::report::{CheckReport, Preview};
use super::CheckKind;
use crate::config::HarnessConfig;
use crate::io::{load_mtx, load_npy_matrix};
use crate::reference::{self, SageParams};
use crate::tensors::{Adjacency, Layout};
use crate::utils::tensor_utils::format_matrix;
use crate::validation::{compare, compare_rows, compare_where, ComparisonMode, Tolerance};

/// Softmax rows are summed in f32 over every class
const ROW_SUM_TOLERANCE: Tolerance = Tolerance {
    atol: 1e-5,
    rtol: 1e-5,
};

/// Inputs shared by several checks, read-only once loaded
#[derive(Default)]
pub struct Inputs {
    /// Node features, (nodes, features)
    pub features: Option<Tensor>,
    /// Adjacency, (nodes, nodes)
    pub adjacency: Option<Adjacency>,
}

impl Inputs {
    /// Load what `checks` need from `dir`
    pub fn load(dir: &Path, checks: &[CheckKind], device: &Device) -> Result<Self> {
        let mut inputs = Self::default();

        if checks.iter().any(|k| k.needs_features()) {
            let features = load_npy_matrix(dir.join(FEATURES), device)?;
            info!("Features: {:?}", features.dims());
            inputs.features = Some(features);
        }

        if checks.iter().any(|k| k.needs_adjacency()) {
            let adjacency = load_mtx(dir.join(ADJACENCY))?;
            info!(
                "Adjacency: {}x{}, {} entries",
                adjacency.rows(),
                adjacency.cols(),
                adjacency.nnz()
            );
            inputs.adjacency = Some(adjacency);
        }

        Ok(inputs)
    }
}

/// Runs checks against one dataset directory
pub struct Harness {
    config: HarnessConfig,
    dir: PathBuf,
    device: Device,
    inputs: Inputs,
}

impl Harness {
    /// Resolve the dataset directory and load the shared inputs
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let dir = config.dataset_dir()?;
        Self::with_dir(config, dir)
    }

    /// Load the shared inputs from an explicit dataset directory
    pub fn with_dir<P: AsRef<Path>>(config: HarnessConfig, dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let device = Device::Cpu;
        info!("Dataset directory: {:?}", dir);
        let inputs = Inputs::load(&dir, &config.checks, &device)?;
        Ok(Self::from_parts(config, dir, inputs))
    }

    /// Assemble from already loaded inputs
    pub fn from_parts(config: HarnessConfig, dir: PathBuf, inputs: Inputs) -> Self {
        Self {
            config,
            dir,
            device: Device::Cpu,
            inputs,
        }
    }

    /// Dataset directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Active configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every configured check, reports in configured order
    pub fn run(&self) -> Result<Vec<CheckReport>> {
        if self.config.checks.is_empty() {
            anyhow::bail!("No checks selected");
        }

        if !self.config.parallel {
            return self
                .config
                .checks
                .iter()
                .map(|&kind| self.run_check(kind))
                .collect();
        }

        self.config
            .checks
            .par_iter()
            .map(|&kind| self.run_check(kind))
            .collect()
    }

    /// Run a single check
    pub fn run_check(&self, kind: CheckKind) -> Result<CheckReport> {
        info!("Running check '{}'", kind);
        let report = match kind {
            CheckKind::Write => self.check_write(),
            CheckKind::Dropout => self.check_dropout(),
            CheckKind::Transpose => self.check_transpose(),
            CheckKind::GraphConv => self.check_graph_conv(),
            CheckKind::GraphConvMean => self.check_graph_conv_mean(),
            CheckKind::Relu => self.check_relu(),
            CheckKind::SageLinear => self.check_sage_linear(),
            CheckKind::LogSoftmax => self.check_log_softmax(),
        }
        .with_context(|| format!("Check '{}' failed", kind))?;
        debug!("Check '{}' done: {:.6}", kind, report.fraction());
        Ok(report)
    }

    /// Load an artifact and convert it to its logical row-major form
    pub fn load_artifact(&self, file: &str) -> Result<Tensor> {
        let stored = load_npy_matrix(self.dir.join(file), &self.device)?;
        let layout = self.config.layout_for(file);
        if layout != Layout::RowMajor {
            debug!("{}: converting from {}", file, layout.as_str());
        }
        layout.apply(&stored)
    }

    fn features(&self) -> Result<&Tensor> {
        self.inputs
            .features
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Features were not loaded"))
    }

    fn adjacency(&self) -> Result<&Adjacency> {
        self.inputs
            .adjacency
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Adjacency was not loaded"))
    }

    fn close(&self) -> ComparisonMode {
        ComparisonMode::Close(self.config.tolerance)
    }

    fn check_write(&self) -> Result<CheckReport> {
        let features = self.features()?;
        let written = self.load_artifact(FEATURES_WRITE)?;

        let mut report = CheckReport::new(CheckKind::Write);
        report
            .comparisons
            .push(compare("features_write", &written, features, ComparisonMode::Exact)?);
        Ok(report)
    }

    fn check_dropout(&self) -> Result<CheckReport> {
        let features = self.features()?;
        let stored = self.load_artifact(DROPOUT_RESULT)?;
        let p = self.config.dropout.probability;

        let sampled = reference::dropout(features, p, self.config.dropout.seed)?;
        let mut report = CheckReport::new(CheckKind::Dropout);
        report
            .comparisons
            .push(compare("seeded sample", &stored, &sampled, ComparisonMode::Exact)?);

        // Kept elements must be x / (1 - p) whatever the mask was
        let stored_values: Vec<f32> = stored.flatten_all()?.to_vec1()?;
        let feature_values: Vec<f32> = features.flatten_all()?.to_vec1()?;
        let kept: Vec<bool> = stored_values.iter().map(|&v| v != 0.0).collect();
        let scaled = reference::dropout_scale(features, p)?;
        report.comparisons.push(compare_where(
            "kept elements scaled",
            &stored,
            &scaled,
            self.close(),
            &kept,
        )?);

        let candidates = feature_values.iter().filter(|&&v| v != 0.0).count();
        let dropped = feature_values
            .iter()
            .zip(&stored_values)
            .filter(|&(&x, &y)| x != 0.0 && y == 0.0)
            .count();
        let observed = dropped as f64 / candidates.max(1) as f64;
        report.notes.push(format!(
            "zeroed fraction of non-zero inputs: {:.4} (p = {})",
            observed, p
        ));
        report
            .notes
            .push("dropout masks are random; the seeded sample is best-effort only".to_string());
        Ok(report)
    }

    fn check_transpose(&self) -> Result<CheckReport> {
        let features = self.features()?;
        let stored = self.load_artifact(FEATURES_T)?;
        let expected = reference::transpose(features)?;

        let mut report = CheckReport::new(CheckKind::Transpose);
        report
            .notes
            .push(format!("features_T shape {:?}", stored.dims()));
        report
            .notes
            .push(format!("features_T_true shape {:?}", expected.dims()));
        report
            .comparisons
            .push(compare("features_T", &stored, &expected, ComparisonMode::Exact)?);
        Ok(report)
    }

    fn check_graph_conv(&self) -> Result<CheckReport> {
        let stored = self.load_artifact(GRAPH_CONV_RESULT)?;
        let expected = reference::graph_conv_sum(self.adjacency()?, self.features()?)?;

        let mut report = CheckReport::new(CheckKind::GraphConv);
        report
            .comparisons
            .push(compare("graph_conv", &stored, &expected, ComparisonMode::Exact)?);
        Ok(report)
    }

    fn check_graph_conv_mean(&self) -> Result<CheckReport> {
        let stored = self.load_artifact(GRAPH_CONV_MEAN_RESULT)?;
        let policy = self.config.zero_degree;
        let mean = reference::graph_conv_mean(self.adjacency()?, self.features()?, policy)?;

        let mut report = CheckReport::new(CheckKind::GraphConvMean);
        report.comparisons.push(compare_rows(
            "graph_conv_mean",
            &stored,
            &mean.result,
            self.close(),
            &mean.row_mask,
        )?);
        if !mean.isolated.is_empty() {
            report.notes.push(format!(
                "{} zero-degree node(s), policy '{}'",
                mean.isolated.len(),
                policy.as_str()
            ));
        }
        Ok(report)
    }

    fn check_relu(&self) -> Result<CheckReport> {
        let stored = self.load_artifact(RELU_RESULT)?;
        let expected = reference::relu(self.features()?)?;

        let mut report = CheckReport::new(CheckKind::Relu);
        report
            .comparisons
            .push(compare("relu", &stored, &expected, self.close())?);
        Ok(report)
    }

    fn check_sage_linear(&self) -> Result<CheckReport> {
        let params = SageParams {
            self_weight: self.load_artifact(SELF_WEIGHT)?,
            self_bias: self.load_artifact(SELF_BIAS)?,
            neigh_weight: self.load_artifact(NEIGH_WEIGHT)?,
            neigh_bias: self.load_artifact(NEIGH_BIAS)?,
        };
        let in_features = self.load_artifact(LINEAR_IN_FEATURES)?;
        let in_aggregate = self.load_artifact(LINEAR_IN_AGGREGATE)?;
        let stored = self.load_artifact(LINEAR_RESULT)?;

        let expected = reference::sage_linear(&params, &in_features, &in_aggregate)?;

        let mut report = CheckReport::new(CheckKind::SageLinear);
        report
            .comparisons
            .push(compare("sage_linear", &stored, &expected, self.close())?);
        Ok(report)
    }

    fn check_log_softmax(&self) -> Result<CheckReport> {
        let input = self.load_artifact(LOG_SOFTMAX_IN)?;
        let stored = self.load_artifact(LOG_SOFTMAX_OUT)?;
        let expected = reference::log_softmax(&input)?;
        let n = self.config.preview;

        let mut report = CheckReport::new(CheckKind::LogSoftmax);
        report.previews.push(Preview {
            label: format!("log_softmax_in[0:{n}, 0:{n}]"),
            text: format_matrix(&input, n, n)?,
        });
        report.previews.push(Preview {
            label: format!("expected[0:{n}, 0:{n}]"),
            text: format_matrix(&expected, n, n)?,
        });

        // Log-softmax of the first few inputs of the leading rows alone
        let (rows, cols) = input.dims2()?;
        for row in 0..rows.min(2) {
            let slice = input.get(row)?.narrow(0, 0, cols.min(n))?;
            let local = reference::log_softmax(&slice)?;
            report.previews.push(Preview {
                label: format!("log_softmax(log_softmax_in[{row}, 0:{n}])"),
                text: format_matrix(&local, 1, n)?,
            });
        }

        report
            .comparisons
            .push(compare("log_softmax", &stored, &expected, self.close())?);

        let row_sums = stored.exp()?.sum_keepdim(1)?;
        let ones = row_sums.ones_like()?;
        report.comparisons.push(compare(
            "exp(log_softmax_out) row sums",
            &row_sums,
            &ones,
            ComparisonMode::Close(ROW_SUM_TOLERANCE),
        )?);
        Ok(report)
    }
}
