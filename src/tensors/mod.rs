//! Matrix containers shared by the checks
//!
//! - Sparse adjacency (`sprs` CSR) and its product with dense features
//! - Layout adapter for column-major artifacts

mod layout;
mod sparse;

pub use layout::{to_column_major, to_row_major, Layout};
pub use sparse::{row_sums, spmm, Adjacency};
pub use sprs::{CsMat, TriMat};
