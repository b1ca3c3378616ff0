//! Sparse adjacency on top of `sprs`
//!
//! The graph is held as a CSR `CsMat<f32>`. Products with dense node
//! features are computed on the host and handed back as candle tensors.

use anyhow::Result;
use candle_core::{DType, Tensor};
use sprs::CsMat;

/// Graph adjacency, rows and columns indexed by node id
pub type Adjacency = CsMat<f32>;

/// Sum of each row, i.e. `A . 1`
pub fn row_sums(adjacency: &Adjacency) -> Vec<f32> {
    adjacency
        .outer_iterator()
        .map(|row| row.iter().map(|(_, &v)| v).sum())
        .collect()
}

/// Sparse x dense product `A . X`
///
/// `dense` must be rank 2 with `adjacency.cols()` rows.
pub fn spmm(adjacency: &Adjacency, dense: &Tensor) -> Result<Tensor> {
    if !adjacency.is_csr() {
        anyhow::bail!("Adjacency must be stored row-major (CSR)");
    }
    let (inner, width) = dense.dims2()?;
    if inner != adjacency.cols() {
        anyhow::bail!(
            "Cannot multiply {}x{} sparse matrix with {}x{} dense matrix",
            adjacency.rows(),
            adjacency.cols(),
            inner,
            width
        );
    }

    let x: Vec<f32> = dense.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
    let mut out = vec![0.0f32; adjacency.rows() * width];
    for (row, entries) in adjacency.outer_iterator().enumerate() {
        let target = &mut out[row * width..(row + 1) * width];
        for (col, &value) in entries.iter() {
            let source = &x[col * width..(col + 1) * width];
            for (t, s) in target.iter_mut().zip(source) {
                *t += value * s;
            }
        }
    }

    Ok(Tensor::from_vec(out, (adjacency.rows(), width), dense.device())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use sprs::TriMat;

    fn path_graph() -> Adjacency {
        // 0 - 1 - 2, plus an isolated node 3
        let mut tri = TriMat::new((4, 4));
        for &(r, c) in &[(0, 1), (1, 0), (1, 2), (2, 1)] {
            tri.add_triplet(r, c, 1.0f32);
        }
        tri.to_csr()
    }

    #[test]
    fn test_row_sums() {
        assert_eq!(row_sums(&path_graph()), vec![1.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_spmm_matches_dense() {
        let device = Device::Cpu;
        let adj = path_graph();
        let x = Tensor::from_vec((0..8).map(|v| v as f32).collect::<Vec<_>>(), (4, 2), &device).unwrap();

        let mut dense = vec![0.0f32; 16];
        for (row, entries) in adj.outer_iterator().enumerate() {
            for (col, &v) in entries.iter() {
                dense[row * 4 + col] = v;
            }
        }
        let dense = Tensor::from_vec(dense, (4, 4), &device).unwrap();

        let sparse = spmm(&adj, &x).unwrap();
        assert_eq!(
            sparse.to_vec2::<f32>().unwrap(),
            dense.matmul(&x).unwrap().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_identity_spmm() {
        let device = Device::Cpu;
        let x = Tensor::ones((3, 2), DType::F32, &device).unwrap();
        let y = spmm(&CsMat::eye(3), &x).unwrap();
        assert_eq!(y.to_vec2::<f32>().unwrap(), x.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn test_duplicates_accumulate() {
        let mut tri = TriMat::new((1, 1));
        tri.add_triplet(0, 0, 1.0f32);
        tri.add_triplet(0, 0, 2.0f32);
        let adj: Adjacency = tri.to_csr();
        let x = Tensor::ones((1, 1), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(spmm(&adj, &x).unwrap().to_vec2::<f32>().unwrap(), vec![vec![3.0]]);
    }

    #[test]
    fn test_spmm_shape_mismatch() {
        let x = Tensor::ones((3, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(spmm(&path_graph(), &x).is_err());
    }

    #[test]
    fn test_csc_rejected() {
        let adj: Adjacency = CsMat::eye_csc(2);
        let x = Tensor::ones((2, 1), DType::F32, &Device::Cpu).unwrap();
        assert!(spmm(&adj, &x).is_err());
    }
}
