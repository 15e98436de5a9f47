//! odce CLI: evaluate detection results on maritime obstacle detection datasets.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use odce::dataset::ObstacleKind;
use odce::{
    AssemblyOptions, DatasetFile, EvalMode, EvaluationConfig, FsResources, ProcessEngine,
    SequenceContext,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "odce")]
#[command(about = "Obstacle detection challenge evaluation for maritime USV datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate detection results under all three challenge setups.
    Evaluate(CliEvaluateArgs),

    /// Write the assembled ground-truth and detection corpus as COCO JSON.
    Convert(CliConvertArgs),

    /// Render the ignore mask of a single frame as a PNG.
    RenderMask(CliRenderMaskArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Full,
    Edge,
    Dz,
}

impl From<ModeArg> for EvalMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Full => EvalMode::Full,
            ModeArg::Edge => EvalMode::Edge,
            ModeArg::Dz => EvalMode::DangerZone,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliConfigArgs {
    /// Evaluation configuration (JSON). Defaults are used for missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the danger-zone radius in meters.
    #[arg(long)]
    dz_range: Option<f64>,

    /// Override the assumed camera height in meters.
    #[arg(long)]
    camera_height: Option<f64>,

    /// Accept calibration files of any resolution.
    #[arg(long)]
    any_resolution: bool,
}

impl CliConfigArgs {
    fn to_config(&self) -> CliResult<EvaluationConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("Loading configuration: {}", path.display());
                EvaluationConfig::from_json_file(path)?
            }
            None => EvaluationConfig::default(),
        };
        if let Some(range) = self.dz_range {
            config.danger_zone.range_m = range;
        }
        if let Some(height) = self.camera_height {
            config.danger_zone.camera_height_m = height;
        }
        if self.any_resolution {
            config.expected_image_size = None;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Args)]
struct CliEvaluateArgs {
    /// Dataset JSON file; calibration and masks are resolved next to it.
    dataset: PathBuf,

    /// Detection results JSON file.
    results: PathBuf,

    /// Metric engine program. Reads the corpus as JSON on stdin and prints
    /// twelve summary statistics as a JSON array.
    #[arg(long)]
    engine: PathBuf,

    /// Extra argument passed to the metric engine (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Sequences to evaluate, e.g. `1,3-5`. All sequences by default.
    #[arg(long)]
    sequences: Option<String>,

    /// Write the per-setup F-scores (JSON).
    #[arg(long)]
    output_file: Option<PathBuf>,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args)]
struct CliConvertArgs {
    /// Dataset JSON file.
    dataset: PathBuf,

    /// Detection results JSON file.
    results: PathBuf,

    /// Ignore-mask mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    mode: ModeArg,

    /// Collapse all categories into one.
    #[arg(long)]
    ignore_class: bool,

    /// Sequences to convert, e.g. `1,3-5`. All sequences by default.
    #[arg(long)]
    sequences: Option<String>,

    /// Output path for the ground-truth corpus (JSON).
    #[arg(long)]
    out_gt: PathBuf,

    /// Output path for the detection list (JSON).
    #[arg(long)]
    out_dt: PathBuf,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args)]
struct CliRenderMaskArgs {
    /// Dataset JSON file.
    dataset: PathBuf,

    /// Sequence id.
    #[arg(long)]
    sequence: i64,

    /// Frame id within the sequence.
    #[arg(long)]
    frame: i64,

    /// Ignore-mask mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Edge)]
    mode: ModeArg,

    /// Output PNG path (ignored pixels white).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    config: CliConfigArgs,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate(args) => run_evaluate(&args),
        Commands::Convert(args) => run_convert(&args),
        Commands::RenderMask(args) => run_render_mask(&args),
    }
}

/// Parse a sequence list such as `1,3-5` into `{1, 3, 4, 5}`.
///
/// Malformed tokens are skipped with a warning.
fn parse_sequence_list(list: &str) -> BTreeSet<i64> {
    let mut ids = BTreeSet::new();
    for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let parsed = match token.split_once('-') {
            Some((lo, hi)) => match (lo.trim().parse::<i64>(), hi.trim().parse::<i64>()) {
                (Ok(lo), Ok(hi)) if lo <= hi => Some(lo..=hi),
                _ => None,
            },
            None => token.parse::<i64>().ok().map(|id| id..=id),
        };
        match parsed {
            Some(range) => ids.extend(range),
            None => tracing::warn!("Ignoring malformed sequence token {:?}", token),
        }
    }
    ids
}

fn sequence_filter(list: Option<&str>) -> Option<BTreeSet<i64>> {
    let ids = parse_sequence_list(list?);
    tracing::info!("Selected sequences: {:?}", ids);
    Some(ids)
}

fn load_inputs(dataset: &Path, results: &Path) -> CliResult<(DatasetFile, DatasetFile)> {
    tracing::info!("Loading dataset: {}", dataset.display());
    let ground_truth = DatasetFile::from_json_file(dataset)?;
    tracing::info!("Loading results: {}", results.display());
    let results = DatasetFile::from_json_file(results)?;
    Ok((ground_truth, results))
}

fn run_evaluate(args: &CliEvaluateArgs) -> CliResult<()> {
    let config = args.config.to_config()?;
    let (ground_truth, results) = load_inputs(&args.dataset, &args.results)?;
    let resources = FsResources::for_dataset_file(&args.dataset);
    let engine = ProcessEngine::new(&args.engine).with_args(args.engine_args.iter().cloned());
    let sequences = sequence_filter(args.sequences.as_deref());

    let challenge = odce::evaluate_challenge(
        &ground_truth,
        &results,
        &resources,
        &engine,
        sequences.as_ref(),
        &config,
    )?;

    if let Some(path) = &args.output_file {
        let json = serde_json::to_string_pretty(&challenge)?;
        std::fs::write(path, &json)?;
        tracing::info!("Results written to {}", path.display());
    }

    println!("Challenge results (F_avg, F_s1, F_s2, F_s3):");
    println!(
        "{:.3} {:.3} {:.3} {:.3}",
        challenge.f_avg(),
        challenge.setup1.all,
        challenge.setup2.all,
        challenge.setup3.all
    );
    Ok(())
}

fn run_convert(args: &CliConvertArgs) -> CliResult<()> {
    let config = args.config.to_config()?;
    let (ground_truth, results) = load_inputs(&args.dataset, &args.results)?;
    let resources = FsResources::for_dataset_file(&args.dataset);
    let options = AssemblyOptions::new(args.mode.into(), args.ignore_class)
        .with_sequences(sequence_filter(args.sequences.as_deref()));

    let corpus = odce::assemble(&ground_truth, &results, &resources, &options, &config)?;

    std::fs::write(&args.out_gt, serde_json::to_string(&corpus.ground_truth)?)?;
    tracing::info!("Ground truth written to {}", args.out_gt.display());
    std::fs::write(&args.out_dt, serde_json::to_string(&corpus.detections)?)?;
    tracing::info!("Detections written to {}", args.out_dt.display());
    Ok(())
}

fn run_render_mask(args: &CliRenderMaskArgs) -> CliResult<()> {
    let config = args.config.to_config()?;
    tracing::info!("Loading dataset: {}", args.dataset.display());
    let dataset = DatasetFile::from_json_file(&args.dataset)?;
    let sequence = dataset
        .sequence(args.sequence)
        .ok_or_else(|| format!("sequence {} not found", args.sequence))?;
    let frame = sequence
        .frame(args.frame)
        .ok_or_else(|| format!("frame {} not found in sequence {}", args.frame, sequence.id))?;

    let resources = FsResources::for_dataset_file(&args.dataset);
    let ctx = SequenceContext::load(sequence, &resources, &config)?;
    let exhaustive = sequence.frame_exhaustive(frame);
    let mut mask = odce::frame_mask(args.mode.into(), exhaustive, frame, &ctx, &config)?;
    for obstacle in &frame.obstacles {
        if obstacle.kind()? == ObstacleKind::Negative {
            mask.ignore_region(&obstacle.bbox);
        }
    }

    tracing::info!(
        "Frame {}/{} ({}x{}, exhaustive={}): {} ignored pixels",
        sequence.id,
        frame.id,
        mask.width(),
        mask.height(),
        exhaustive,
        mask.ignored_count()
    );
    mask.to_visual().save(&args.out)?;
    tracing::info!("Mask written to {}", args.out.display());
    Ok(())
}
