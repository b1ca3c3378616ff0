//! Utility functions and helpers
//!
//! This module provides common utilities used across the crate.

/// Tensor utilities
pub mod tensor_utils {
    use anyhow::Result;
    use candle_core::{DType, Tensor};

    /// Render the top-left `max_rows x max_cols` corner of a matrix
    ///
    /// One line per row, values comma separated. Rank-1 tensors are
    /// shown as a single row.
    pub fn format_matrix(tensor: &Tensor, max_rows: usize, max_cols: usize) -> Result<String> {
        let tensor = match tensor.rank() {
            1 => tensor.unsqueeze(0)?,
            2 => tensor.clone(),
            rank => anyhow::bail!("Cannot preview a rank-{} tensor", rank),
        };
        let (rows, cols) = tensor.dims2()?;
        let corner = tensor
            .narrow(0, 0, rows.min(max_rows))?
            .narrow(1, 0, cols.min(max_cols))?
            .to_dtype(DType::F32)?
            .to_vec2::<f32>()?;

        let lines: Vec<String> = corner
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| format!("{:.6}", v))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Count NaN entries
    pub fn count_nans(tensor: &Tensor) -> Result<usize> {
        let values: Vec<f32> = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
        Ok(values.iter().filter(|v| v.is_nan()).count())
    }

}
