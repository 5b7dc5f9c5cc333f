use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec, CounterVec, HistogramVec, IntCounterVec, IntGaugeVec,
};

pub static INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tracker_broker_inflight",
        "Inflight requests per tracker host",
        &["host"]
    )
    .expect("inflight metric")
});

pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tracker_broker_requests_total",
        "Requests by tracker host and status class",
        &["host", "status"]
    )
    .expect("requests total")
});

pub static RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tracker_broker_retries_total",
        "Retries by tracker host and reason",
        &["host", "reason"]
    )
    .expect("retries")
});

pub static SLEEP_SECONDS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tracker_broker_sleep_seconds_total",
        "Total seconds spent waiting before retries per host and reason",
        &["host", "reason"]
    )
    .expect("sleep seconds")
});

pub static RATE_REMAINING: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tracker_broker_rate_remaining",
        "Last reported rate limit remaining per tracker host",
        &["host"]
    )
    .expect("rate remaining")
});

pub static CACHE_HITS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tracker_broker_cache_hits_total",
        "Cache hits by backend",
        &["backend"]
    )
    .expect("cache hits")
});

pub static CACHE_MISSES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tracker_broker_cache_misses_total",
        "Cache misses by backend",
        &["backend"]
    )
    .expect("cache misses")
});

pub static CACHE_REVALIDATED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tracker_broker_cache_revalidated_total",
        "Expired entries confirmed unchanged with a 304, per host",
        &["host"]
    )
    .expect("cache revalidated")
});

pub static CACHE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tracker_broker_cache_errors_total",
        "Cache backend failures by backend and operation",
        &["backend", "op"]
    )
    .expect("cache errors")
});

pub static LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tracker_broker_latency_seconds",
        "Request latency per tracker host",
        &["host"]
    )
    .expect("latency")
});

pub fn status_class(status: http::StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
