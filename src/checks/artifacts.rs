//! File names written by the pipeline, and how each is laid out

use crate::tensors::Layout;

/// Sparse adjacency, Matrix Market
pub const ADJACENCY: &str = "adjacency.mtx";
/// Node features
pub const FEATURES: &str = "features.npy";
/// Features re-saved by the pipeline
pub const FEATURES_WRITE: &str = "features_write.npy";
/// Dropout output
pub const DROPOUT_RESULT: &str = "dropout_result.npy";
/// Transposed features
pub const FEATURES_T: &str = "features_T.npy";
/// Sum aggregation output
pub const GRAPH_CONV_RESULT: &str = "graph_conv_result.npy";
/// Mean aggregation output
pub const GRAPH_CONV_MEAN_RESULT: &str = "graph_conv_mean_result.npy";
/// ReLU output
pub const RELU_RESULT: &str = "relu_result.npy";
/// SAGE self-branch weight
pub const SELF_WEIGHT: &str = "self_weight.npy";
/// SAGE self-branch bias
pub const SELF_BIAS: &str = "self_bias.npy";
/// SAGE neighbour-branch weight
pub const NEIGH_WEIGHT: &str = "neigh_weight.npy";
/// SAGE neighbour-branch bias
pub const NEIGH_BIAS: &str = "neigh_bias.npy";
/// SAGE self-branch input
pub const LINEAR_IN_FEATURES: &str = "linear_in_features.npy";
/// SAGE neighbour-branch input
pub const LINEAR_IN_AGGREGATE: &str = "linear_in_aggregate.npy";
/// SAGE output
pub const LINEAR_RESULT: &str = "linear_result.npy";
/// Log-softmax input
pub const LOG_SOFTMAX_IN: &str = "log_softmax_in.npy";
/// Log-softmax output
pub const LOG_SOFTMAX_OUT: &str = "log_softmax_out.npy";

/// Layout the pipeline uses when saving `file`
///
/// Graph convolution and log-softmax buffers are dumped straight from
/// column-major device memory.
pub fn default_layout(file: &str) -> Layout {
    match file {
        GRAPH_CONV_RESULT | GRAPH_CONV_MEAN_RESULT | LOG_SOFTMAX_IN | LOG_SOFTMAX_OUT => {
            Layout::ColumnMajor
        }
        _ => Layout::RowMajor,
    }
}
