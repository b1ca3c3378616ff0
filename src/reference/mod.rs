//! Reference computations for each pipeline layer
//!
//! Every function recomputes, on the CPU with candle, what the GPU
//! pipeline should have written for one layer. Inputs and outputs are
//! logical row-major matrices; layout correction happens at load time.

use anyhow::Result;
use candle_core::{DType, Tensor, D};
use candle_nn::{Linear, Module};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::tensors::{row_sums, spmm, Adjacency};

/// What to do with nodes whose adjacency row sums to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDegreePolicy {
    /// Leave the rows out of the comparison
    #[default]
    Skip,
    /// Expect zeros for those rows
    ZeroFill,
    /// Abort the check
    Error,
}

impl ZeroDegreePolicy {
    /// Name used in configuration and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::ZeroFill => "zero_fill",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for ZeroDegreePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skip" => Ok(Self::Skip),
            "zero_fill" | "zero-fill" => Ok(Self::ZeroFill),
            "error" => Ok(Self::Error),
            other => anyhow::bail!("Unknown zero-degree policy: {}", other),
        }
    }
}

/// Degree-normalized aggregation
pub struct MeanAggregation {
    /// Expected result, shape (nodes, features)
    pub result: Tensor,
    /// Rows that count for comparison (false for skipped isolated nodes)
    pub row_mask: Vec<bool>,
    /// Indices of nodes with zero row sum
    pub isolated: Vec<usize>,
}

/// Plain matrix transpose
pub fn transpose(x: &Tensor) -> Result<Tensor> {
    Ok(x.t()?.contiguous()?)
}

/// Sum aggregation `A . X`
pub fn graph_conv_sum(adjacency: &Adjacency, features: &Tensor) -> Result<Tensor> {
    spmm(adjacency, features)
}

/// Mean aggregation: `A . X` with row i divided by the row sum of `A`
pub fn graph_conv_mean(
    adjacency: &Adjacency,
    features: &Tensor,
    policy: ZeroDegreePolicy,
) -> Result<MeanAggregation> {
    let summed = spmm(adjacency, features)?;
    let degrees = row_sums(adjacency);
    let isolated: Vec<usize> = degrees
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0.0)
        .map(|(i, _)| i)
        .collect();

    if !isolated.is_empty() {
        match policy {
            ZeroDegreePolicy::Error => anyhow::bail!(
                "{} node(s) have zero degree (first: {})",
                isolated.len(),
                isolated[0]
            ),
            _ => warn!(
                "{} node(s) have zero degree, applying policy '{}'",
                isolated.len(),
                policy.as_str()
            ),
        }
    }

    // Zero-degree rows of A.X are already zero; dividing by 1 keeps them so
    let divisors: Vec<f32> = degrees
        .iter()
        .map(|&d| if d == 0.0 { 1.0 } else { d })
        .collect();
    let rows = divisors.len();
    let divisors = Tensor::from_vec(divisors, (rows, 1), features.device())?;
    let result = summed.broadcast_div(&divisors)?;

    let mut row_mask = vec![true; rows];
    if policy == ZeroDegreePolicy::Skip {
        for &i in &isolated {
            row_mask[i] = false;
        }
    }

    Ok(MeanAggregation {
        result,
        row_mask,
        isolated,
    })
}

/// Element-wise `max(0, x)`
pub fn relu(x: &Tensor) -> Result<Tensor> {
    Ok(x.relu()?)
}

/// Parameters of one SAGE linear layer as the pipeline saves them
///
/// Weights are `(in, out)`; biases hold `out` values in any 1-D or
/// column/row shape.
pub struct SageParams {
    /// Weight applied to the node's own features
    pub self_weight: Tensor,
    /// Bias of the self branch
    pub self_bias: Tensor,
    /// Weight applied to the aggregated neighbour features
    pub neigh_weight: Tensor,
    /// Bias of the neighbour branch
    pub neigh_bias: Tensor,
}

fn branch(weight: &Tensor, bias: &Tensor) -> Result<Linear> {
    let (_, out) = weight.dims2()?;
    let bias = bias.flatten_all()?;
    if bias.dim(0)? != out {
        anyhow::bail!(
            "Bias has {} values, weight has {} output columns",
            bias.dim(0)?,
            out
        );
    }
    // candle's Linear stores (out, in)
    Ok(Linear::new(weight.t()?.contiguous()?, Some(bias)))
}

/// Two-branch SAGE linear layer
///
/// `(features . W_self + b_self) + (aggregate . W_neigh + b_neigh)`
pub fn sage_linear(params: &SageParams, features: &Tensor, aggregate: &Tensor) -> Result<Tensor> {
    let self_branch = branch(&params.self_weight, &params.self_bias)?;
    let neigh_branch = branch(&params.neigh_weight, &params.neigh_bias)?;

    let self_result = self_branch.forward(features)?;
    let neigh_result = neigh_branch.forward(aggregate)?;
    Ok((self_result + neigh_result)?)
}

/// Log-softmax along the last axis
///
/// candle subtracts the row maximum before exponentiating.
pub fn log_softmax(x: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::ops::log_softmax(x, D::Minus1)?)
}

/// Inverted dropout with a seeded mask
///
/// Each element is zeroed with probability `p`; kept elements are scaled
/// by `1 / (1 - p)`.
pub fn dropout(x: &Tensor, p: f32, seed: u64) -> Result<Tensor> {
    if !(0.0..1.0).contains(&p) {
        anyhow::bail!("Dropout probability must be in [0, 1), got {}", p);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let scale = 1.0 / (1.0 - p);
    let mask: Vec<f32> = (0..x.elem_count())
        .map(|_| if rng.gen::<f32>() < p { 0.0 } else { scale })
        .collect();
    debug!("Sampled dropout mask with p={} seed={}", p, seed);

    let mask = Tensor::from_vec(mask, x.dims(), x.device())?;
    Ok(x.to_dtype(DType::F32)?.mul(&mask)?)
}

/// What every kept element becomes under inverted dropout, `x / (1 - p)`
pub fn dropout_scale(x: &Tensor, p: f32) -> Result<Tensor> {
    Ok((x.to_dtype(DType::F32)? * (1.0 / (1.0 - p as f64)))?)
}
