//! Comparison utilities
//!
//! Tools for judging pipeline artifacts against reference values:
//! - Exact and tolerance-based element agreement
//! - Row and element masks for partial comparisons

mod comparator;

pub use comparator::{
    compare, compare_rows, compare_where, Comparison, ComparisonMode, Tolerance,
};
