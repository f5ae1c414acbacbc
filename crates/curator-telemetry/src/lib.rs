use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use tracing_subscriber::{fmt, EnvFilter};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static CHANNEL_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    let cv = CounterVec::new(Opts::new("curator_channel_requests_total", "Worker channel requests by method and outcome"), &["method", "outcome"]).unwrap();
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});
static SCORES: Lazy<CounterVec> = Lazy::new(|| {
    let cv = CounterVec::new(Opts::new("curator_scores_total", "Relevance scoring calls by outcome"), &["outcome"]).unwrap();
    REGISTRY.register(Box::new(cv.clone())).ok();
    cv
});

/// Logs go to stderr: the worker's stdout is the protocol channel and the
/// curator's stdout carries the report.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr);
    // JSON logs if CURATOR_LOG_JSON=1. A second init keeps the first subscriber.
    let _ = if std::env::var("CURATOR_LOG_JSON").ok().as_deref() == Some("1") {
        fmt.json().try_init()
    } else {
        fmt.try_init()
    };
}

pub fn inc_channel_request(method: &str, outcome: &str) { CHANNEL_REQUESTS.with_label_values(&[method, outcome]).inc(); }
pub fn inc_score(outcome: &str) { SCORES.with_label_values(&[outcome]).inc(); }

pub fn gather_prometheus() -> String {
    // Touch the counters so they are registered even when never incremented.
    Lazy::force(&CHANNEL_REQUESTS);
    Lazy::force(&SCORES);
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).ok();
    String::from_utf8(buffer).unwrap_or_default()
}
