use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

lazy_static! {
    // Backend API Metrics
    pub static ref API_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_api_calls_total",
        "Total number of calls to the quiz backend",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref API_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "quiz_api_call_duration_seconds",
        "Quiz backend call duration in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Session Metrics
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_sessions_total",
        "Quiz sessions by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "quiz_sessions_active",
        "Number of sessions currently in progress"
    )
    .unwrap();

    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_submissions_total",
        "Submissions by trigger",
        &["trigger"]
    )
    .unwrap();

    pub static ref DUPLICATE_SUBMITS_IGNORED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_duplicate_submits_ignored_total",
        "Submit triggers ignored because the session had already left InProgress",
        &["trigger"]
    )
    .unwrap();

    pub static ref RESULT_TRANSMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_result_transmissions_total",
        "Result transmissions by status",
        &["status"]
    )
    .unwrap();

    pub static ref DATA_INCONSISTENCIES_TOTAL: IntCounter = register_int_counter!(
        "quiz_data_inconsistencies_total",
        "Questions scored as zero because their data was malformed"
    )
    .unwrap();

    pub static ref SCORE_RATIO: Histogram = register_histogram!(
        "quiz_score_ratio",
        "Awarded points divided by possible points per attempt",
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a backend call with metrics
pub async fn track_api_call<F, T, E>(operation: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    API_CALLS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    API_CALL_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

pub fn record_score(awarded: f64, possible: f64) {
    if possible > 0.0 {
        SCORE_RATIO.observe(awarded / possible);
    }
}
