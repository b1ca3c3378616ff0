//! The eight pipeline checks
//!
//! Each check loads one or more artifacts written by the GPU pipeline,
//! recomputes the expected values and reports how many elements agree.
//! Checks are independent; they share only the features and adjacency
//! loaded once by the [`Harness`].

mod artifacts;
mod harness;
mod report;

pub use artifacts::*;
pub use harness::{Harness, Inputs};
pub use report::{print_summary, CheckReport, Preview};

use serde::Deserialize;

/// Identifier of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum CheckKind {
    /// Re-saved features match the originals
    Write,
    /// Dropout output (best-effort, statistical)
    Dropout,
    /// Transposed features
    Transpose,
    /// Sum aggregation over the adjacency
    GraphConv,
    /// Degree-normalized aggregation
    GraphConvMean,
    /// ReLU activation
    Relu,
    /// Two-branch SAGE linear layer
    SageLinear,
    /// Row-wise log-softmax
    LogSoftmax,
}

impl CheckKind {
    /// Every check, in pipeline order
    pub const ALL: [CheckKind; 8] = [
        CheckKind::Write,
        CheckKind::Dropout,
        CheckKind::Transpose,
        CheckKind::GraphConv,
        CheckKind::GraphConvMean,
        CheckKind::Relu,
        CheckKind::SageLinear,
        CheckKind::LogSoftmax,
    ];

    /// Identifier used in configuration and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Dropout => "dropout",
            Self::Transpose => "transpose",
            Self::GraphConv => "graph_conv",
            Self::GraphConvMean => "graph_conv_mean",
            Self::Relu => "relu",
            Self::SageLinear => "sage_linear",
            Self::LogSoftmax => "log_softmax",
        }
    }

    /// Heading printed above the check's results
    pub fn label(self) -> &'static str {
        match self {
            Self::Write => "Write",
            Self::Dropout => "Dropout",
            Self::Transpose => "Transposed features",
            Self::GraphConv => "Graph convolution",
            Self::GraphConvMean => "Graph convolution with mean",
            Self::Relu => "ReLU",
            Self::SageLinear => "SageLinear",
            Self::LogSoftmax => "Log-softmax",
        }
    }

    /// Artifact files read by this check, besides the shared inputs
    pub fn artifacts(self) -> &'static [&'static str] {
        match self {
            Self::Write => &[FEATURES_WRITE],
            Self::Dropout => &[DROPOUT_RESULT],
            Self::Transpose => &[FEATURES_T],
            Self::GraphConv => &[GRAPH_CONV_RESULT],
            Self::GraphConvMean => &[GRAPH_CONV_MEAN_RESULT],
            Self::Relu => &[RELU_RESULT],
            Self::SageLinear => &[
                SELF_WEIGHT,
                SELF_BIAS,
                NEIGH_WEIGHT,
                NEIGH_BIAS,
                LINEAR_IN_FEATURES,
                LINEAR_IN_AGGREGATE,
                LINEAR_RESULT,
            ],
            Self::LogSoftmax => &[LOG_SOFTMAX_IN, LOG_SOFTMAX_OUT],
        }
    }

    /// Whether the check reads the shared feature matrix
    pub fn needs_features(self) -> bool {
        matches!(
            self,
            Self::Write
                | Self::Dropout
                | Self::Transpose
                | Self::GraphConv
                | Self::GraphConvMean
                | Self::Relu
        )
    }

    /// Whether the check reads the shared adjacency matrix
    pub fn needs_adjacency(self) -> bool {
        matches!(self, Self::GraphConv | Self::GraphConvMean)
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown check: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in CheckKind::ALL {
            assert_eq!(kind.as_str().parse::<CheckKind>().unwrap(), kind);
        }
        assert!("softmax".parse::<CheckKind>().is_err());
    }

    #[test]
    fn test_shared_inputs() {
        assert!(CheckKind::GraphConvMean.needs_adjacency());
        assert!(!CheckKind::Relu.needs_adjacency());
        assert!(!CheckKind::LogSoftmax.needs_features());
        assert!(!CheckKind::SageLinear.needs_features());
    }

    #[test]
    fn test_sage_linear_artifacts() {
        let files = CheckKind::SageLinear.artifacts();
        assert_eq!(files.len(), 7);
        assert!(files.contains(&LINEAR_RESULT));
    }
}
