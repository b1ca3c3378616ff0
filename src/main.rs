//! alzheimer-check CLI - verify GPU pipeline dumps against CPU references

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use alzheimer_check::checks::print_summary;
use alzheimer_check::io::{load_mtx, load_npy, load_npy_matrix};
use alzheimer_check::reference::ZeroDegreePolicy;
use alzheimer_check::tensors::row_sums;
use alzheimer_check::utils::tensor_utils::{count_nans, format_matrix};
use alzheimer_check::{CheckKind, Harness, HarnessConfig, VERSION};

/// alzheimer-check - Compare GNN pipeline outputs with reference computations
#[derive(Parser, Debug)]
#[command(name = "alzheimer-check")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run checks against a dataset directory
    Check {
        /// Check to run (repeatable)
        #[arg(long = "check", value_enum)]
        checks: Vec<CheckKind>,

        /// Run every check
        #[arg(long)]
        all: bool,

        /// Path to YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding the datasets
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Dataset sub-directory
        #[arg(long)]
        dataset: Option<String>,

        /// Absolute tolerance for approximate checks
        #[arg(long)]
        atol: Option<f64>,

        /// Relative tolerance for approximate checks
        #[arg(long)]
        rtol: Option<f64>,

        /// Zero-degree policy for mean aggregation (skip, zero_fill, error)
        #[arg(long)]
        zero_degree: Option<String>,

        /// Dropout probability
        #[arg(long)]
        dropout_p: Option<f32>,

        /// Seed for the reference dropout mask
        #[arg(long)]
        seed: Option<u64>,

        /// Rows/columns shown in previews
        #[arg(long)]
        preview: Option<usize>,

        /// Run checks on separate threads
        #[arg(long)]
        parallel: bool,
    },

    /// Describe a .npy or .mtx file
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Rows/columns shown in the preview
        #[arg(long, default_value = "10")]
        preview: usize,
    },

    /// List available checks and the files they read
    List,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn create_spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn inspect(file: &Path, preview: usize) -> Result<()> {
    let extension = file.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match extension {
        "npy" => {
            let array = load_npy(file)?;
            println!("File:          {:?}", file);
            println!("dtype:         {} ({:?})", array.descr, array.dtype);
            println!("shape:         {:?}", array.shape);
            println!("fortran_order: {}", array.fortran_order);

            if (1..=2).contains(&array.shape.len()) {
                let tensor = load_npy_matrix(file, &Device::Cpu)?;
                println!("NaNs:          {}", count_nans(&tensor)?);
                println!("----");
                println!("{}", format_matrix(&tensor, preview, preview)?);
            }
        }
        "mtx" => {
            let matrix = load_mtx(file)?;
            let degrees = row_sums(&matrix);
            let isolated = degrees.iter().filter(|&&d| d == 0.0).count();
            let max = degrees.iter().copied().fold(0.0f32, f32::max);
            let mean = degrees.iter().sum::<f32>() / degrees.len().max(1) as f32;

            println!("File:     {:?}", file);
            println!("shape:    {}x{}", matrix.rows(), matrix.cols());
            println!("entries:  {}", matrix.nnz());
            println!("degree:   mean {:.4}, max {}", mean, max);
            println!("isolated: {}", isolated);
        }
        _ => anyhow::bail!("Unsupported file type: {:?}", file),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("alzheimer-check v{}", VERSION);

    match cli.command {
        Commands::Check {
            checks,
            all,
            config,
            data_dir,
            dataset,
            atol,
            rtol,
            zero_degree,
            dropout_p,
            seed,
            preview,
            parallel,
        } => {
            let mut cfg = match &config {
                Some(path) => {
                    info!("Loading config from {:?}", path);
                    HarnessConfig::load(path)?
                }
                None => HarnessConfig::default(),
            };

            if all {
                cfg.checks = CheckKind::ALL.to_vec();
            } else if !checks.is_empty() {
                cfg.checks = checks;
            }
            if let Some(dir) = data_dir {
                cfg.data_dir = Some(dir);
            }
            if let Some(name) = dataset {
                cfg.dataset = name;
            }
            if let Some(atol) = atol {
                cfg.tolerance.atol = atol;
            }
            if let Some(rtol) = rtol {
                cfg.tolerance.rtol = rtol;
            }
            if let Some(policy) = zero_degree {
                cfg.zero_degree = policy.parse::<ZeroDegreePolicy>()?;
            }
            if let Some(p) = dropout_p {
                cfg.dropout.probability = p;
            }
            if let Some(seed) = seed {
                cfg.dropout.seed = seed;
            }
            if let Some(n) = preview {
                cfg.preview = n;
            }
            cfg.parallel |= parallel;
            cfg.validate()?;

            if cfg.checks.is_empty() {
                anyhow::bail!("No checks selected; pass --check <name> or --all");
            }

            let pb = create_spinner("Loading shared inputs...")?;
            let harness = Harness::new(cfg);
            pb.finish_and_clear();
            let harness = harness.context("Failed to load dataset")?;

            let reports = harness.run()?;
            for report in &reports {
                println!("{}", report.render(cli.verbose));
                println!();
            }
            print_summary(&reports);

            Ok(())
        }

        Commands::Inspect { file, preview } => inspect(&file, preview),

        Commands::List => {
            for kind in CheckKind::ALL {
                println!("{:<16} {}", kind.as_str(), kind.label());
                for file in kind.artifacts() {
                    println!("    {}", file);
                }
            }
            Ok(())
        }
    }
}
