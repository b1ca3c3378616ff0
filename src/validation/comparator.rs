//! Element-wise agreement between stored artifacts and references
//!
//! Compares pipeline outputs to recomputed values either exactly or with
//! NumPy `isclose` semantics, and reports the fraction that agree.

use anyhow::Result;
use candle_core::{DType, Tensor};
use serde::Deserialize;

/// Absolute/relative tolerance for approximate comparisons
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Absolute tolerance
    pub atol: f64,
    /// Relative tolerance, scaled by the expected value
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            atol: 1e-8,
            rtol: 1e-5,
        }
    }
}

/// How two elements are judged equal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComparisonMode {
    /// Bitwise-equal values (NaN never equal)
    Exact,
    /// `|stored - expected| <= atol + rtol * |expected|`
    Close(Tolerance),
}

impl ComparisonMode {
    /// Whether `stored` agrees with `expected`
    pub fn agrees(self, stored: f32, expected: f32) -> bool {
        match self {
            Self::Exact => stored == expected,
            Self::Close(tol) => {
                if stored.is_infinite() || expected.is_infinite() {
                    return stored == expected;
                }
                let diff = (stored as f64 - expected as f64).abs();
                diff <= tol.atol + tol.rtol * (expected as f64).abs()
            }
        }
    }

    /// Short label for reports
    pub fn label(self) -> String {
        match self {
            Self::Exact => "exact".to_string(),
            Self::Close(tol) => format!("isclose(atol={:e}, rtol={:e})", tol.atol, tol.rtol),
        }
    }
}

/// Outcome of comparing one stored array with its reference
#[derive(Debug, Clone)]
pub struct Comparison {
    /// What was compared
    pub name: String,
    /// Shape shared by both arrays
    pub shape: Vec<usize>,
    /// Equality rule used
    pub mode: ComparisonMode,
    /// Number of agreeing elements
    pub equal: usize,
    /// Number of elements taking part in the comparison
    pub compared: usize,
    /// Elements left out by a mask
    pub excluded: usize,
    /// Maximum absolute difference over finite pairs
    pub max_abs_diff: f64,
    /// Mean absolute difference over finite pairs
    pub mean_abs_diff: f64,
    /// First disagreeing element: (flat index, stored, expected)
    pub first_mismatch: Option<(usize, f32, f32)>,
}

impl Comparison {
    /// Fraction of compared elements that agree
    ///
    /// An empty comparison counts as full agreement.
    pub fn fraction(&self) -> f64 {
        if self.compared == 0 {
            1.0
        } else {
            self.equal as f64 / self.compared as f64
        }
    }

    /// Whether every compared element agrees
    pub fn all_equal(&self) -> bool {
        self.equal == self.compared
    }

    /// Summary string
    pub fn summary(&self) -> String {
        let mut line = format!("Percentage of equal elements: {:?}", self.fraction());
        if self.compared == 0 {
            line.push_str(" (no elements compared)");
        } else if self.excluded > 0 {
            line.push_str(&format!(" ({} elements excluded)", self.excluded));
        }
        line
    }

    /// Multi-line detail for verbose output
    pub fn details(&self) -> String {
        let mut text = format!(
            "  {} [{}] shape {:?}: {}/{} agree, max_diff={:.2e}, mean_diff={:.2e}",
            self.name,
            self.mode.label(),
            self.shape,
            self.equal,
            self.compared,
            self.max_abs_diff,
            self.mean_abs_diff
        );
        if let Some((idx, stored, expected)) = self.first_mismatch {
            text.push_str(&format!(
                "\n  first mismatch at [{}]: stored={:.6}, expected={:.6}",
                idx, stored, expected
            ));
        }
        text
    }
}

fn values(tensor: &Tensor) -> Result<Vec<f32>> {
    Ok(tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?)
}

fn check_shapes(name: &str, stored: &Tensor, expected: &Tensor) -> Result<()> {
    if stored.dims() != expected.dims() {
        anyhow::bail!(
            "{}: shape mismatch, stored {:?} vs expected {:?}",
            name,
            stored.dims(),
            expected.dims()
        );
    }
    Ok(())
}

/// Compare every element of two equally shaped arrays
pub fn compare(name: &str, stored: &Tensor, expected: &Tensor, mode: ComparisonMode) -> Result<Comparison> {
    check_shapes(name, stored, expected)?;
    Ok(compare_values(
        name,
        stored.dims().to_vec(),
        &values(stored)?,
        &values(expected)?,
        mode,
        None,
    ))
}

/// Compare only the rows whose mask entry is true
pub fn compare_rows(
    name: &str,
    stored: &Tensor,
    expected: &Tensor,
    mode: ComparisonMode,
    row_mask: &[bool],
) -> Result<Comparison> {
    check_shapes(name, stored, expected)?;
    let (rows, cols) = stored.dims2()?;
    if row_mask.len() != rows {
        anyhow::bail!("{}: row mask has {} entries for {} rows", name, row_mask.len(), rows);
    }
    let mask: Vec<bool> = row_mask
        .iter()
        .flat_map(|&keep| std::iter::repeat(keep).take(cols))
        .collect();
    Ok(compare_values(
        name,
        vec![rows, cols],
        &values(stored)?,
        &values(expected)?,
        mode,
        Some(&mask),
    ))
}

/// Compare only the elements whose mask entry is true
pub fn compare_where(
    name: &str,
    stored: &Tensor,
    expected: &Tensor,
    mode: ComparisonMode,
    mask: &[bool],
) -> Result<Comparison> {
    check_shapes(name, stored, expected)?;
    if mask.len() != stored.elem_count() {
        anyhow::bail!(
            "{}: mask has {} entries for {} elements",
            name,
            mask.len(),
            stored.elem_count()
        );
    }
    Ok(compare_values(
        name,
        stored.dims().to_vec(),
        &values(stored)?,
        &values(expected)?,
        mode,
        Some(mask),
    ))
}

fn compare_values(
    name: &str,
    shape: Vec<usize>,
    stored: &[f32],
    expected: &[f32],
    mode: ComparisonMode,
    mask: Option<&[bool]>,
) -> Comparison {
    let mut equal = 0usize;
    let mut compared = 0usize;
    let mut finite = 0usize;
    let mut max_diff = 0.0f64;
    let mut sum_diff = 0.0f64;
    let mut first_mismatch = None;

    for (i, (&s, &e)) in stored.iter().zip(expected).enumerate() {
        if mask.is_some_and(|m| !m[i]) {
            continue;
        }
        compared += 1;

        if mode.agrees(s, e) {
            equal += 1;
        } else if first_mismatch.is_none() {
            first_mismatch = Some((i, s, e));
        }

        if s.is_finite() && e.is_finite() {
            let diff = (s as f64 - e as f64).abs();
            max_diff = max_diff.max(diff);
            sum_diff += diff;
            finite += 1;
        }
    }

    Comparison {
        name: name.to_string(),
        shape,
        mode,
        equal,
        compared,
        excluded: stored.len() - compared,
        max_abs_diff: max_diff,
        mean_abs_diff: sum_diff / finite.max(1) as f64,
        first_mismatch,
    }
}
