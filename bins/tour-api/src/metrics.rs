// Prometheus collectors for the run endpoint
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use tour_common::ExecutionResult;

lazy_static! {
    static ref RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tour_runs_total",
        "Code runs by Go version and outcome",
        &["version", "outcome"]
    )
    .unwrap();
    static ref RUN_DURATION: HistogramVec = register_histogram_vec!(
        "tour_run_duration_seconds",
        "Wall-clock time of code runs",
        &["version"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

pub fn record_run(result: &ExecutionResult) {
    let version = result
        .used_version
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let outcome = result.error_kind.map(|k| k.as_str()).unwrap_or("success");

    RUNS_TOTAL.with_label_values(&[version.as_str(), outcome]).inc();
    RUN_DURATION
        .with_label_values(&[version.as_str()])
        .observe(result.elapsed.as_secs_f64());
}

pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
