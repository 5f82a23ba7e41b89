//! In-process counters and the upstream latency histogram, rendered in the
//! Prometheus text exposition format by `GET /metrics`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Fixed histogram bucket upper bounds in ms. Model calls are slow, so the
/// buckets stretch well past a second.
const UPSTREAM_BUCKETS_MS: &[u64] = &[50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];

pub struct Metrics {
    requests_total: AtomicU64,
    rate_limited_total: AtomicU64,
    validation_failures_total: AtomicU64,
    upstream_errors_total: AtomicU64,
    fallbacks_total: AtomicU64,
    upstream_counts: Vec<AtomicU64>,
    upstream_sum_ms: AtomicU64,
    upstream_count: AtomicU64,
    process_start_epoch: f64,
    process_start_instant: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub rate_limited: u64,
    pub validation_failures: u64,
    pub upstream_errors: u64,
    pub fallbacks: u64,
    pub upstream_calls: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let start = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            requests_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            validation_failures_total: AtomicU64::new(0),
            upstream_errors_total: AtomicU64::new(0),
            fallbacks_total: AtomicU64::new(0),
            upstream_counts: UPSTREAM_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            upstream_sum_ms: AtomicU64::new(0),
            upstream_count: AtomicU64::new(0),
            process_start_epoch: start.as_secs_f64(),
            process_start_instant: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_upstream_ms(&self, ms: u64) {
        self.upstream_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.upstream_count.fetch_add(1, Ordering::Relaxed);
        // find first bucket >= value
        if let Some(idx) = UPSTREAM_BUCKETS_MS.iter().position(|ub| ms <= *ub) {
            self.upstream_counts[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Seconds since the process started, from a monotonic clock.
    pub fn uptime_secs(&self) -> f64 {
        self.process_start_instant.elapsed().as_secs_f64()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests_total.load(Ordering::Relaxed),
            rate_limited: self.rate_limited_total.load(Ordering::Relaxed),
            validation_failures: self.validation_failures_total.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors_total.load(Ordering::Relaxed),
            fallbacks: self.fallbacks_total.load(Ordering::Relaxed),
            upstream_calls: self.upstream_count.load(Ordering::Relaxed),
        }
    }

    pub fn render(&self) -> String {
        let snap = self.snapshot();
        let mut buf = String::new();
        counter(
            &mut buf,
            "prompt_wizard_requests_total",
            "Requests that entered the prompt pipeline",
            snap.requests,
        );
        counter(
            &mut buf,
            "prompt_wizard_rate_limited_total",
            "Requests rejected by the rate limiter",
            snap.rate_limited,
        );
        counter(
            &mut buf,
            "prompt_wizard_validation_failures_total",
            "Requests rejected by schema validation",
            snap.validation_failures,
        );
        counter(
            &mut buf,
            "prompt_wizard_upstream_errors_total",
            "Model calls that failed",
            snap.upstream_errors,
        );
        counter(
            &mut buf,
            "prompt_wizard_fallbacks_total",
            "Model replies that could not be parsed and were replaced by a fallback",
            snap.fallbacks,
        );
        writeln!(
            &mut buf,
            "# HELP prompt_wizard_upstream_latency_ms Model call latency histogram milliseconds"
        )
        .ok();
        writeln!(&mut buf, "# TYPE prompt_wizard_upstream_latency_ms histogram").ok();
        let mut cumulative: u64 = 0;
        for (i, ub) in UPSTREAM_BUCKETS_MS.iter().enumerate() {
            cumulative += self.upstream_counts[i].load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "prompt_wizard_upstream_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "prompt_wizard_upstream_latency_ms_bucket{{le=\"+Inf\"}} {}",
            snap.upstream_calls
        )
        .ok();
        writeln!(
            &mut buf,
            "prompt_wizard_upstream_latency_ms_sum {}",
            self.upstream_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            &mut buf,
            "prompt_wizard_upstream_latency_ms_count {}",
            snap.upstream_calls
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP prompt_wizard_build_info Build information\n# TYPE prompt_wizard_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "prompt_wizard_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP prompt_wizard_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE prompt_wizard_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "prompt_wizard_process_start_time_seconds {}",
            self.process_start_epoch
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP prompt_wizard_process_uptime_seconds Process uptime seconds\n# TYPE prompt_wizard_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "prompt_wizard_process_uptime_seconds {}",
            self.uptime_secs()
        )
        .ok();
        buf
    }
}

fn counter(buf: &mut String, name: &str, help: &str, value: u64) {
    writeln!(buf, "# HELP {} {}", name, help).ok();
    writeln!(buf, "# TYPE {} counter", name).ok();
    writeln!(buf, "{} {}", name, value).ok();
}
