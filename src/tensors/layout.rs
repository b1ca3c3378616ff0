//! Storage layout adapter for pipeline artifacts
//!
//! The pipeline keeps some matrices column-major on the GPU and saves the
//! raw buffer with the row-major shape `(rows, columns)` in the header.
//! Loading such a file gives an `(n, m)` array whose flat data is really
//! the `(m, n)` transpose. [`to_row_major`] undoes that.

use anyhow::Result;
use candle_core::Tensor;
use serde::Deserialize;

/// How an artifact's payload is laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Flat data matches the header shape
    #[default]
    RowMajor,
    /// Flat data is column-major under a row-major header
    ColumnMajor,
}

impl Layout {
    /// Convert a loaded artifact to the logical row-major array
    pub fn apply(self, stored: &Tensor) -> Result<Tensor> {
        match self {
            Self::RowMajor => Ok(stored.clone()),
            Self::ColumnMajor => to_row_major(stored),
        }
    }

    /// Name used in configuration and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RowMajor => "row_major",
            Self::ColumnMajor => "column_major",
        }
    }
}

/// Reinterpret an `(n, m)` column-major buffer as a row-major `(n, m)` array
///
/// Reshape to `(m, n)`, then transpose. Not self-inverse.
pub fn to_row_major(stored: &Tensor) -> Result<Tensor> {
    let (n, m) = stored.dims2()?;
    Ok(stored.contiguous()?.reshape((m, n))?.t()?.contiguous()?)
}

/// Write a row-major `(n, m)` array in the pipeline's column-major form
pub fn to_column_major(logical: &Tensor) -> Result<Tensor> {
    let (n, m) = logical.dims2()?;
    Ok(logical.t()?.contiguous()?.reshape((n, m))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn sample() -> Tensor {
        Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_to_column_major_flat_order() {
        let stored = to_column_major(&sample()).unwrap();
        assert_eq!(stored.dims(), &[2, 3]);
        let flat: Vec<f32> = stored.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(flat, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_round_trip() {
        let restored = to_row_major(&to_column_major(&sample()).unwrap()).unwrap();
        assert_eq!(
            restored.to_vec2::<f32>().unwrap(),
            sample().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_not_self_inverse() {
        let twice = to_row_major(&to_row_major(&sample()).unwrap()).unwrap();
        assert_eq!(twice.dims(), &[2, 3]);
        assert_ne!(
            twice.to_vec2::<f32>().unwrap(),
            sample().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_row_major_layout_is_identity() {
        let out = Layout::RowMajor.apply(&sample()).unwrap();
        assert_eq!(out.to_vec2::<f32>().unwrap(), sample().to_vec2::<f32>().unwrap());
    }
}
