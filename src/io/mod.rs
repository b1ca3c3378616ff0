//! Loading and saving pipeline artifacts
//!
//! - NumPy `.npy` arrays (features, layer results, parameters)
//! - Matrix Market `.mtx` sparse matrices (adjacency)

mod mtx;
mod npy;

pub use mtx::{load_mtx, read_mtx};
pub use npy::{
    load_npy, load_npy_f32, load_npy_matrix, read_npy, save_npy_f32, save_tensor, NpyArray,
    NpyDtype,
};
