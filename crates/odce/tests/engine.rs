#![cfg(unix)]

use approx::assert_relative_eq;
use odce::score::score_corpus;
use odce::{
    EngineError, EngineParams, EvaluationConfig, EvaluationCorpus, MetricEngine, ProcessEngine,
};

fn shell(script: &str) -> ProcessEngine {
    ProcessEngine::new("sh").with_args(["-c", script])
}

#[test]
fn process_engine_reads_last_stdout_line() {
    let engine = shell(
        "cat > /dev/null; echo 'evaluating...'; echo '[0.8,0,0,0,0,0,0,0,0.6,0,0,0]'",
    );
    let scores = score_corpus(
        &engine,
        &EvaluationCorpus::default(),
        &EvaluationConfig::default(),
    )
    .unwrap();
    assert_relative_eq!(scores.all, 0.96 / 1.4, epsilon = 1e-12);
    assert_eq!(scores.large, 0.0);
}

#[test]
fn process_engine_receives_request_on_stdin() {
    // Echo back a statistic only when the request carries the expected fields.
    let engine = shell(
        "if grep -q '\"iou_type\":\"bbox\"'; then \
         echo '[1,0,0,0,0,0,0,0,1,0,0,0]'; else echo '[0,0,0,0,0,0,0,0,0,0,0,0]'; fi",
    );
    let params = EngineParams::from_config(&EvaluationConfig::default());
    let stats = engine
        .evaluate(&EvaluationCorpus::default(), &params)
        .unwrap();
    assert_eq!(stats[0], 1.0);
    assert_eq!(stats[8], 1.0);
}

#[test]
fn process_engine_failure_is_reported() {
    let engine = shell("cat > /dev/null; exit 3");
    let params = EngineParams::from_config(&EvaluationConfig::default());
    let err = engine
        .evaluate(&EvaluationCorpus::default(), &params)
        .unwrap_err();
    assert!(matches!(err, EngineError::Exit { code: Some(3), .. }));
}

#[test]
fn missing_engine_program_is_reported() {
    let engine = ProcessEngine::new("/nonexistent/odce-metric-engine");
    let params = EngineParams::from_config(&EvaluationConfig::default());
    let err = engine
        .evaluate(&EvaluationCorpus::default(), &params)
        .unwrap_err();
    assert!(matches!(err, EngineError::Io { .. }));
}
