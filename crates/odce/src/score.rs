//! F-score reduction and the three challenge setups.
//!
//! The corpus is handed to an external COCO-style metric engine that reports
//! twelve summary statistics. Precision and recall are read at fixed
//! indices and reduced to F1 scores overall and per object size.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::corpus::{
    assemble, AssemblyError, AssemblyOptions, DetectionEntry, EvalMode, EvaluationCorpus,
    GroundTruth,
};
use crate::dataset::DatasetFile;
use crate::resources::SequenceResources;

/// Number of summary statistics reported by the metric engine.
pub const NUM_STATS: usize = 12;

/// `(precision, recall)` statistic indices for all, small, medium and large objects.
const PR_INDICES: [(usize, usize); 4] = [(0, 8), (3, 9), (4, 10), (5, 11)];

// ── Error type ─────────────────────────────────────────────────────────────

/// Metric engine failures.
#[derive(Debug)]
pub enum EngineError {
    /// The engine program could not be started or talked to.
    Io {
        program: PathBuf,
        source: std::io::Error,
    },
    /// The engine exited unsuccessfully.
    Exit { program: PathBuf, code: Option<i32> },
    /// The request could not be encoded.
    Encode(serde_json::Error),
    /// The engine output is not a list of twelve statistics.
    MalformedOutput { reason: String },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { program, source } => {
                write!(f, "metric engine {}: {}", program.display(), source)
            }
            Self::Exit { program, code } => match code {
                Some(code) => write!(
                    f,
                    "metric engine {} exited with status {}",
                    program.display(),
                    code
                ),
                None => write!(f, "metric engine {} was terminated", program.display()),
            },
            Self::Encode(e) => write!(f, "cannot encode metric engine request: {}", e),
            Self::MalformedOutput { reason } => {
                write!(f, "malformed metric engine output: {}", reason)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised while evaluating a setup.
#[derive(Debug)]
pub enum EvaluationError {
    Assembly(AssemblyError),
    Engine(EngineError),
}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assembly(e) => write!(f, "{}", e),
            Self::Engine(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EvaluationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Assembly(e) => Some(e),
            Self::Engine(e) => Some(e),
        }
    }
}

impl From<AssemblyError> for EvaluationError {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}

impl From<EngineError> for EvaluationError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

// ── Metric engine ──────────────────────────────────────────────────────────

/// Evaluation parameters passed to the metric engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineParams {
    pub iou_thresholds: Vec<f64>,
    /// Geometry used for matching; always `bbox`.
    pub iou_type: &'static str,
}

impl EngineParams {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            iou_thresholds: config.iou_thresholds.clone(),
            iou_type: "bbox",
        }
    }
}

/// A COCO-style detection metric engine.
///
/// Statistic layout: precision at 0 (all), 3/4/5 (small/medium/large);
/// recall at 8 (all), 9/10/11 (small/medium/large). `-1` marks a statistic
/// that could not be computed.
pub trait MetricEngine {
    fn evaluate(
        &self,
        corpus: &EvaluationCorpus,
        params: &EngineParams,
    ) -> Result<[f64; NUM_STATS], EngineError>;
}

#[derive(Serialize)]
struct EngineRequest<'a> {
    ground_truth: &'a GroundTruth,
    detections: &'a [DetectionEntry],
    #[serde(flatten)]
    params: &'a EngineParams,
}

/// Metric engine running as an external program.
///
/// The request `{"ground_truth", "detections", "iou_thresholds", "iou_type"}`
/// is written to the program's stdin; the last non-empty line of its stdout
/// must be a JSON array of twelve numbers (`null` is read as NaN).
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn io_err(&self, source: std::io::Error) -> EngineError {
        EngineError::Io {
            program: self.program.clone(),
            source,
        }
    }
}

impl MetricEngine for ProcessEngine {
    fn evaluate(
        &self,
        corpus: &EvaluationCorpus,
        params: &EngineParams,
    ) -> Result<[f64; NUM_STATS], EngineError> {
        let request = serde_json::to_vec(&EngineRequest {
            ground_truth: &corpus.ground_truth,
            detections: &corpus.detections,
            params,
        })
        .map_err(EngineError::Encode)?;

        tracing::debug!(
            "running metric engine {} ({} byte request)",
            self.program.display(),
            request.len()
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.io_err(e))?;

        // The engine may write stdout before it has drained stdin.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                stdin.write_all(&request)?;
                stdin.flush()
            })
        });
        let output = child.wait_with_output().map_err(|e| self.io_err(e))?;
        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::warn!("metric engine closed stdin before reading the full request");
                }
                Ok(Err(e)) => return Err(self.io_err(e)),
                Err(_) => {
                    return Err(self.io_err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "stdin writer panicked",
                    )))
                }
            }
        }
        if !output.status.success() {
            return Err(EngineError::Exit {
                program: self.program.clone(),
                code: output.status.code(),
            });
        }
        parse_engine_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the statistics line from engine stdout.
pub fn parse_engine_output(stdout: &str) -> Result<[f64; NUM_STATS], EngineError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| EngineError::MalformedOutput {
            reason: "no output".to_string(),
        })?;
    let values: Vec<Option<f64>> =
        serde_json::from_str(line).map_err(|e| EngineError::MalformedOutput {
            reason: format!("{}: {:?}", e, line),
        })?;
    let values: Vec<f64> = values
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    values
        .try_into()
        .map_err(|v: Vec<f64>| EngineError::MalformedOutput {
            reason: format!("expected {} statistics, got {}", NUM_STATS, v.len()),
        })
}

// ── Reduction ──────────────────────────────────────────────────────────────

/// F1 score; `0` unless both precision and recall are non-zero.
pub fn f_score(precision: f64, recall: f64) -> f64 {
    if precision != 0.0 && recall != 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Replace non-finite and `-1` ("not computed") statistics with `0`.
pub fn sanitize_stats(stats: &[f64; NUM_STATS]) -> [f64; NUM_STATS] {
    (*stats).map(|v| if !v.is_finite() || v == -1.0 { 0.0 } else { v })
}

/// F1 scores overall and per object size.
///
/// Serialized as `[all, small, medium, large]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct FScores {
    pub all: f64,
    pub small: f64,
    pub medium: f64,
    pub large: f64,
}

impl From<[f64; 4]> for FScores {
    fn from(v: [f64; 4]) -> Self {
        Self {
            all: v[0],
            small: v[1],
            medium: v[2],
            large: v[3],
        }
    }
}

impl From<FScores> for [f64; 4] {
    fn from(s: FScores) -> Self {
        [s.all, s.small, s.medium, s.large]
    }
}

/// Reduce the twelve engine statistics to F1 scores.
pub fn reduce_stats(stats: &[f64; NUM_STATS]) -> FScores {
    let stats = sanitize_stats(stats);
    PR_INDICES
        .map(|(p, r)| f_score(stats[p], stats[r]))
        .into()
}

/// Run the engine on a corpus and reduce its statistics.
pub fn score_corpus<E: MetricEngine + ?Sized>(
    engine: &E,
    corpus: &EvaluationCorpus,
    config: &EvaluationConfig,
) -> Result<FScores, EngineError> {
    let stats = engine.evaluate(corpus, &EngineParams::from_config(config))?;
    tracing::debug!("engine statistics: {:?}", stats);
    Ok(reduce_stats(&stats))
}

// ── Challenge setups ───────────────────────────────────────────────────────

/// Challenge evaluation setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setup {
    /// Sea-edge mask, class-aware.
    One,
    /// Sea-edge mask, class-agnostic.
    Two,
    /// Danger-zone mask, class-agnostic.
    Three,
}

impl Setup {
    pub const ALL: [Setup; 3] = [Setup::One, Setup::Two, Setup::Three];

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    pub fn mode(self) -> EvalMode {
        match self {
            Self::One | Self::Two => EvalMode::Edge,
            Self::Three => EvalMode::DangerZone,
        }
    }

    pub fn ignore_class(self) -> bool {
        !matches!(self, Self::One)
    }

    pub fn options(self) -> AssemblyOptions {
        AssemblyOptions::new(self.mode(), self.ignore_class())
    }
}

/// Assemble and score one setup.
pub fn evaluate_setup<R, E>(
    ground_truth: &DatasetFile,
    results: &DatasetFile,
    resources: &R,
    engine: &E,
    setup: Setup,
    sequences: Option<&BTreeSet<i64>>,
    config: &EvaluationConfig,
) -> Result<FScores, EvaluationError>
where
    R: SequenceResources + ?Sized,
    E: MetricEngine + ?Sized,
{
    let options = setup.options().with_sequences(sequences.cloned());
    let corpus = assemble(ground_truth, results, resources, &options, config)?;
    let scores = score_corpus(engine, &corpus, config)?;
    tracing::info!(
        "setup {} ({}, {}): F = {:.1}% (small {:.1}%, medium {:.1}%, large {:.1}%)",
        setup.number(),
        options.mode,
        if options.ignore_class { "class-agnostic" } else { "class-aware" },
        scores.all * 100.0,
        scores.small * 100.0,
        scores.medium * 100.0,
        scores.large * 100.0
    );
    Ok(scores)
}

/// F-scores of the three challenge setups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeResults {
    pub setup1: FScores,
    pub setup2: FScores,
    pub setup3: FScores,
}

impl ChallengeResults {
    /// Mean overall F-score of the three setups.
    pub fn f_avg(&self) -> f64 {
        (self.setup1.all + self.setup2.all + self.setup3.all) / 3.0
    }

    pub fn get(&self, setup: Setup) -> FScores {
        match setup {
            Setup::One => self.setup1,
            Setup::Two => self.setup2,
            Setup::Three => self.setup3,
        }
    }
}

/// Evaluate all three setups in order.
pub fn evaluate_challenge<R, E>(
    ground_truth: &DatasetFile,
    results: &DatasetFile,
    resources: &R,
    engine: &E,
    sequences: Option<&BTreeSet<i64>>,
    config: &EvaluationConfig,
) -> Result<ChallengeResults, EvaluationError>
where
    R: SequenceResources + ?Sized,
    E: MetricEngine + ?Sized,
{
    let run = |setup| {
        evaluate_setup(
            ground_truth,
            results,
            resources,
            engine,
            setup,
            sequences,
            config,
        )
    };
    Ok(ChallengeResults {
        setup1: run(Setup::One)?,
        setup2: run(Setup::Two)?,
        setup3: run(Setup::Three)?,
    })
}
