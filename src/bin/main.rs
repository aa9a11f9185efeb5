//! RDAL Command Line Interface
//!
//! Clusters data with K-Means and trains, applies and inspects kernel SVM
//! models, reading LibSVM and CSV data formats.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};
use rdal::api::{KMeans, SVM};
use rdal::core::{CacheKind, DalError, Result};
use rdal::dispatch::{Device, ExecutionContext, CPU_MAX_WORK_GROUP_SIZE};
use rdal::kernel::KernelFunction;
use rdal::kmeans::InitMethod;
use rdal::persistence::{SerializableClustering, SerializableModel};
use rdal::{CSVDataset, LibSVMDataset, NumericTable};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "rdal")]
#[command(about = "K-Means clustering and kernel SVM training")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a dataset with Lloyd's K-Means
    Kmeans(KMeansArgs),
    /// Train and use SVM models
    Svm {
        #[command(subcommand)]
        command: SvmCommand,
    },
}

#[derive(Subcommand)]
enum SvmCommand {
    /// Train a new SVM model
    Train(TrainArgs),
    /// Make predictions using a trained model
    Predict(PredictArgs),
    /// Evaluate a model on labeled data
    Evaluate(EvaluateArgs),
    /// Display model information
    Info(InfoArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DataFormat {
    /// Pick by file extension
    Auto,
    Libsvm,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Target {
    /// Vectorized CPU kernels on the global thread pool
    Cpu,
    /// Plain scalar CPU kernels
    Scalar,
    /// Staged kernels on a dedicated device pool
    Device,
}

#[derive(Args)]
struct ExecArgs {
    /// Compute target
    #[arg(long, default_value = "cpu")]
    target: Target,

    /// Compute units of the device target (0 = one per core)
    #[arg(long, default_value = "0")]
    compute_units: usize,
}

impl ExecArgs {
    fn context(&self) -> Result<ExecutionContext> {
        Ok(match self.target {
            Target::Cpu => ExecutionContext::cpu(),
            Target::Scalar => ExecutionContext::cpu_scalar(),
            Target::Device => ExecutionContext::with_device(Device::open(
                "cpu-device",
                self.compute_units,
                CPU_MAX_WORK_GROUP_SIZE,
            )?),
        })
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Init {
    /// The first K rows
    First,
    /// K distinct random rows
    Random,
    /// k-means++ seeding
    Plusplus,
}

#[derive(Args)]
struct KMeansArgs {
    /// Data file (LibSVM or CSV format)
    #[arg(long)]
    data: PathBuf,

    /// Number of clusters
    #[arg(short = 'k', long)]
    clusters: usize,

    /// Maximum Lloyd iterations (0 only assigns to the initial centroids)
    #[arg(short, long, default_value = "100")]
    max_iterations: usize,

    /// Stop when the summed squared centroid shift is at or below this value
    #[arg(short, long, default_value = "0.0")]
    accuracy_threshold: f64,

    /// Initial centroid selection
    #[arg(long, default_value = "plusplus")]
    init: Init,

    /// Seed for random and k-means++ initialization
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Rows per partition
    #[arg(long, default_value = "512")]
    block_size: usize,

    /// Data format
    #[arg(short, long, default_value = "auto")]
    format: DataFormat,

    /// CSV input carries a label column to drop
    #[arg(long)]
    labeled: bool,

    /// Save the result as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the cluster of every row
    #[arg(long)]
    assignments: bool,

    #[command(flatten)]
    exec: ExecArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliKernel {
    Linear,
    Rbf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliCache {
    /// Recompute kernel rows every iteration
    None,
    /// Keep every kernel row
    Simple,
    /// Keep a bounded number of kernel rows
    Lru,
}

impl From<CliCache> for CacheKind {
    fn from(cache: CliCache) -> Self {
        match cache {
            CliCache::None => CacheKind::NoCache,
            CliCache::Simple => CacheKind::Simple,
            CliCache::Lru => CacheKind::Lru,
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    /// Training data file (LibSVM or CSV format)
    #[arg(long)]
    data: PathBuf,

    /// Output model file
    #[arg(short, long)]
    output: PathBuf,

    /// Data format
    #[arg(short, long, default_value = "auto")]
    format: DataFormat,

    /// Kernel function
    #[arg(long, default_value = "linear")]
    kernel: CliKernel,

    /// RBF kernel width; defaults to 1 / n_features
    #[arg(long)]
    gamma: Option<f64>,

    /// Regularization parameter C
    #[arg(short = 'C', long, default_value = "1.0")]
    c: f64,

    /// Convergence tolerance
    #[arg(short, long, default_value = "0.001")]
    epsilon: f64,

    /// Maximum iterations
    #[arg(short, long, default_value = "10000")]
    max_iterations: usize,

    /// Kernel cache strategy
    #[arg(long, default_value = "lru")]
    cache: CliCache,

    /// Kernel cache size in MB
    #[arg(long, default_value = "100")]
    cache_size: usize,

    /// Working set size (power of two); derived from the target by default
    #[arg(long)]
    working_set_size: Option<usize>,

    #[command(flatten)]
    exec: ExecArgs,
}

#[derive(Args)]
struct PredictArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Input data file
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Data format
    #[arg(short, long, default_value = "auto")]
    format: DataFormat,

    /// Show confidence scores
    #[arg(long)]
    confidence: bool,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Test data file
    #[arg(long)]
    data: PathBuf,

    /// Data format
    #[arg(short, long, default_value = "auto")]
    format: DataFormat,

    /// Show detailed metrics
    #[arg(long)]
    detailed: bool,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Kmeans(args) => kmeans_command(args),
        Commands::Svm { command } => match command {
            SvmCommand::Train(args) => train_command(args),
            SvmCommand::Predict(args) => predict_command(args),
            SvmCommand::Evaluate(args) => evaluate_command(args),
            SvmCommand::Info(args) => info_command(args),
        },
    };

    if let Err(e) = result {
        error!("Error: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn kmeans_command(args: KMeansArgs) -> Result<()> {
    let (table, _) = load(&args.data, args.format, args.labeled)?;
    info!(
        "Clustering {} rows x {} features into {} clusters",
        table.n_rows(),
        table.n_columns(),
        args.clusters
    );

    let init = match args.init {
        Init::First => InitMethod::Deterministic,
        Init::Random => InitMethod::Random { seed: args.seed },
        Init::Plusplus => InitMethod::PlusPlus { seed: args.seed },
    };
    let kmeans = KMeans::new(args.clusters)
        .with_max_iterations(args.max_iterations)
        .with_accuracy_threshold(args.accuracy_threshold)
        .with_init(init)
        .with_block_size(args.block_size)
        .with_context(args.exec.context()?);

    let result = kmeans.fit(&table)?;

    println!("=== K-Means Result ===");
    println!("Iterations: {}", result.n_iterations);
    if let Some(objective) = result.objective_function {
        println!("Objective: {objective:.6}");
    }
    if result.n_empty_clusters > 0 {
        println!("Empty clusters repaired: {}", result.n_empty_clusters);
    }
    if let Some(centroids) = &result.centroids {
        println!("Centroids:");
        for (k, row) in centroids.to_rows().iter().enumerate() {
            let values: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
            println!("  {k}: {}", values.join(" "));
        }
    }
    if args.assignments {
        if let Some(assignments) = &result.assignments {
            println!("Assignments:");
            for (i, cluster) in assignments.iter().enumerate() {
                println!("{i} {cluster}");
            }
        }
    }

    if let Some(output) = &args.output {
        SerializableClustering::from_result(&result, kmeans.config()).save_to_file(output)?;
        info!("Result saved to: {output:?}");
    }
    Ok(())
}

fn train_command(args: TrainArgs) -> Result<()> {
    info!("Training SVM model...");
    info!("Data file: {:?}", args.data);
    info!(
        "Parameters: C={}, epsilon={}, max_iter={}",
        args.c, args.epsilon, args.max_iterations
    );

    let (table, labels) = load(&args.data, args.format, true)?;
    info!(
        "Loaded {} samples with {} dimensions",
        table.n_rows(),
        table.n_columns()
    );

    let kernel_name = match args.kernel {
        CliKernel::Linear => "linear",
        CliKernel::Rbf => "rbf",
    };
    let gamma = args
        .gamma
        .unwrap_or(1.0 / table.n_columns().max(1) as f64);
    let kernel = KernelFunction::from_name(kernel_name, gamma)?;

    let mut builder = SVM::with_kernel(kernel)
        .with_c(args.c)
        .with_epsilon(args.epsilon)
        .with_max_iterations(args.max_iterations)
        .with_cache_kind(args.cache.into())
        .with_cache_size(args.cache_size * 1024 * 1024) // Convert MB to bytes
        .with_context(args.exec.context()?);
    if let Some(ws) = args.working_set_size {
        builder = builder.with_working_set_size(ws);
    }

    let model = builder.train_table(&table, &labels)?;
    info!("Training completed successfully");

    let info = model.info();
    info!("Support vectors: {}", info.n_support_vectors);
    info!("Bias: {:.6}", info.bias);

    SerializableModel::from_trained_model(&model).save_to_file(&args.output)?;
    info!("Model saved to: {:?}", args.output);

    let accuracy = model.evaluate_table(&table, &labels)?.accuracy();
    info!("Training accuracy: {:.2}%", accuracy * 100.0);

    Ok(())
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;
    let model = serializable_model.to_trained_model()?;

    info!("Loading prediction data from: {:?}", args.data);
    let (table, _) = load(&args.data, args.format, true)?;

    info!(
        "Making predictions using model with {} support vectors",
        serializable_model.metadata.n_support_vectors
    );
    let predictions = model.predict_table(&table)?;

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    writeln!(writer, "# Predictions for {} samples", predictions.len())?;
    writeln!(
        writer,
        "# Format: sample_index predicted_label{}",
        if args.confidence { " confidence" } else { "" }
    )?;
    for (i, pred) in predictions.iter().enumerate() {
        if args.confidence {
            writeln!(writer, "{} {:.0} {:.6}", i, pred.label, pred.confidence())?;
        } else {
            writeln!(writer, "{} {:.0}", i, pred.label)?;
        }
    }
    writer.flush()?;

    if let Some(path) = &args.output {
        info!("Predictions saved to: {path:?}");
    }
    Ok(())
}

fn evaluate_command(args: EvaluateArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;
    let model = serializable_model.to_trained_model()?;

    info!("Loading test data from: {:?}", args.data);
    let (table, labels) = load(&args.data, args.format, true)?;
    let metrics = model.evaluate_table(&table, &labels)?;

    println!("=== Model Evaluation ===");
    serializable_model.print_summary();

    println!("\nTest Results:");
    println!("  Accuracy: {:.2}%", metrics.accuracy() * 100.0);

    if args.detailed {
        println!("\nDetailed Metrics:");
        println!("  True Positives:  {}", metrics.true_positives);
        println!("  True Negatives:  {}", metrics.true_negatives);
        println!("  False Positives: {}", metrics.false_positives);
        println!("  False Negatives: {}", metrics.false_negatives);
        println!("  Precision:       {:.4}", metrics.precision());
        println!("  Recall:          {:.4}", metrics.recall());
        println!("  F1 Score:        {:.4}", metrics.f1_score());
    }

    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;

    serializable_model.print_summary();

    println!("\nSupport Vector Details:");
    println!("  Total: {}", serializable_model.support_vectors.len());

    if let Some(first_sv) = serializable_model.support_vectors.first() {
        println!("  First SV non-zeros: {}", first_sv.indices.len());
        println!(
            "  First SV indices: {:?}",
            &first_sv.indices[..first_sv.indices.len().min(5)]
        );

        if first_sv.indices.len() > 5 {
            println!("    ... ({} more)", first_sv.indices.len() - 5);
        }
    }

    println!("\nAlpha*Y values:");
    let alpha_y = &serializable_model.alpha_y;
    let n_show = alpha_y.len().min(10);
    for (i, &alpha_y_val) in alpha_y.iter().enumerate().take(n_show) {
        println!("  α{i}*y{i}: {alpha_y_val:.6}");
    }
    if alpha_y.len() > n_show {
        println!("  ... ({} more)", alpha_y.len() - n_show);
    }

    Ok(())
}

/// Load a data file as a table plus labels
///
/// Unlabeled loading only changes CSV handling; LibSVM lines always start
/// with a label.
fn load(path: &Path, format: DataFormat, labeled: bool) -> Result<(NumericTable, Vec<f64>)> {
    let format = match format {
        DataFormat::Auto => detect_format(path),
        other => other,
    };
    match format {
        DataFormat::Csv if labeled => Ok(CSVDataset::from_file(path)?.into_parts()),
        DataFormat::Csv => Ok(CSVDataset::from_file_unlabeled(path)?.into_parts()),
        DataFormat::Libsvm => Ok(LibSVMDataset::from_file(path)?.into_parts()),
        DataFormat::Auto => Err(DalError::InvalidParameter(format!(
            "Cannot determine the format of {}",
            path.display()
        ))),
    }
}

fn detect_format(path: &Path) -> DataFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => DataFormat::Csv,
        Some("libsvm") | Some("svm") => DataFormat::Libsvm,
        Some(_) => {
            warn!("Unknown file extension, assuming LibSVM format");
            DataFormat::Libsvm
        }
        None => {
            warn!("No file extension, assuming LibSVM format");
            DataFormat::Libsvm
        }
    }
}
