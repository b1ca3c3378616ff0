//! # alzheimer-check
//!
//! Verification harness for the GPU GNN pipeline in
//! `gpu_memory_reduction/alzheimer`. The pipeline dumps intermediate
//! tensors to disk; this crate reloads them, recomputes each layer with
//! candle on the CPU and reports how many elements agree.
//!
//! ## Checks
//!
//! - Write round-trip, transpose, graph convolution (sum): exact
//! - Graph convolution (mean), ReLU, SAGE linear, log-softmax: `isclose`
//! - Dropout: best-effort, with statistical side checks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use alzheimer_check::{CheckKind, Harness, HarnessConfig};
//!
//! let mut config = HarnessConfig::default();
//! config.checks = vec![CheckKind::GraphConv, CheckKind::LogSoftmax];
//! let harness = Harness::new(config)?;
//! for report in harness.run()? {
//!     println!("{}", report.render(false));
//! }
//! ```

// Require docs for public items, but not struct fields (too verbose)
#![warn(missing_docs)]

pub mod checks;
pub mod config;
pub mod io;
pub mod reference;
pub mod tensors;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use checks::{CheckKind, CheckReport, Harness};
pub use config::HarnessConfig;
pub use validation::{Comparison, ComparisonMode, Tolerance};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the user's home directory
pub const HOME_ENV: &str = "HOME";

/// Data directory relative to the home directory
pub const DEFAULT_DATA_SUBDIR: &str = "gpu_memory_reduction/alzheimer/data";

/// Dataset checked when none is configured
pub const DEFAULT_DATASET: &str = "flickr";
