//! Simple metrics collection for observability
//!
//! Lightweight atomic counters, updated on every admission decision and by
//! the background sweeper, exported in Prometheus text format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use turnstile::{Decision, TrafficClass};

/// Allowed and denied counters for one traffic class
#[derive(Default)]
pub struct ClassCounters {
    pub allowed: AtomicU64,
    pub denied: AtomicU64,
}

/// Core metrics collected by the server
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Total admission decisions, bypasses included
    pub total_decisions: AtomicU64,
    pub bypassed: AtomicU64,

    /// Per-class outcomes
    pub auth: ClassCounters,
    pub api: ClassCounters,
    pub public: ClassCounters,

    /// Decision latency buckets (in microseconds)
    pub latency_under_1ms: AtomicU64,
    pub latency_under_10ms: AtomicU64,
    pub latency_under_100ms: AtomicU64,
    pub latency_under_1s: AtomicU64,
    pub latency_over_1s: AtomicU64,

    /// Histogram support
    pub latency_sum_micros: AtomicU64,

    /// Store metrics
    pub active_keys: AtomicUsize,
    pub idle_evictions: AtomicU64,
    pub capacity_evictions: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_decisions: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            auth: ClassCounters::default(),
            api: ClassCounters::default(),
            public: ClassCounters::default(),
            latency_under_1ms: AtomicU64::new(0),
            latency_under_10ms: AtomicU64::new(0),
            latency_under_100ms: AtomicU64::new(0),
            latency_under_1s: AtomicU64::new(0),
            latency_over_1s: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            active_keys: AtomicUsize::new(0),
            idle_evictions: AtomicU64::new(0),
            capacity_evictions: AtomicU64::new(0),
        }
    }

    pub fn class(&self, class: TrafficClass) -> &ClassCounters {
        match class {
            TrafficClass::Auth => &self.auth,
            TrafficClass::Api => &self.api,
            TrafficClass::Public => &self.public,
        }
    }

    /// Record a decision and how long it took
    pub fn record_decision(&self, decision: &Decision, latency_us: u64) {
        self.total_decisions.fetch_add(1, Ordering::Relaxed);

        match decision {
            Decision::Bypass => {
                self.bypassed.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Allowed(status) => {
                self.class(status.class)
                    .allowed
                    .fetch_add(1, Ordering::Relaxed);
            }
            Decision::Rejected(rejection) => {
                self.class(rejection.class)
                    .denied
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        match latency_us {
            0..=999 => self.latency_under_1ms.fetch_add(1, Ordering::Relaxed),
            1000..=9999 => self.latency_under_10ms.fetch_add(1, Ordering::Relaxed),
            10000..=99999 => self.latency_under_100ms.fetch_add(1, Ordering::Relaxed),
            100000..=999999 => self.latency_under_1s.fetch_add(1, Ordering::Relaxed),
            _ => self.latency_over_1s.fetch_add(1, Ordering::Relaxed),
        };

        self.latency_sum_micros
            .fetch_add(latency_us, Ordering::Relaxed);
    }

    /// Update active keys count
    pub fn update_active_keys(&self, count: usize) {
        self.active_keys.store(count, Ordering::Relaxed);
    }

    /// Publish the store's cumulative eviction totals
    ///
    /// The store owns the counters; these gauges only mirror them, so a
    /// stale read never double counts.
    pub fn update_evictions(&self, idle: u64, capacity: u64) {
        self.idle_evictions.store(idle, Ordering::Relaxed);
        self.capacity_evictions.store(capacity, Ordering::Relaxed);
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);
        // Writing to a String cannot fail
        let _ = self.write_prometheus(&mut output);
        output
    }

    fn write_prometheus(&self, out: &mut String) -> std::fmt::Result {
        writeln!(
            out,
            "# HELP turnstile_uptime_seconds Time since server start in seconds"
        )?;
        writeln!(out, "# TYPE turnstile_uptime_seconds gauge")?;
        writeln!(out, "turnstile_uptime_seconds {}\n", self.uptime_seconds())?;

        writeln!(
            out,
            "# HELP turnstile_decisions_total Total number of admission decisions"
        )?;
        writeln!(out, "# TYPE turnstile_decisions_total counter")?;
        writeln!(
            out,
            "turnstile_decisions_total {}\n",
            self.total_decisions.load(Ordering::Relaxed)
        )?;

        writeln!(
            out,
            "# HELP turnstile_requests_bypassed Requests exempt from admission"
        )?;
        writeln!(out, "# TYPE turnstile_requests_bypassed counter")?;
        writeln!(
            out,
            "turnstile_requests_bypassed {}\n",
            self.bypassed.load(Ordering::Relaxed)
        )?;

        writeln!(
            out,
            "# HELP turnstile_requests_allowed Requests admitted by traffic class"
        )?;
        writeln!(out, "# TYPE turnstile_requests_allowed counter")?;
        for class in TrafficClass::ALL {
            writeln!(
                out,
                "turnstile_requests_allowed{{class=\"{class}\"}} {}",
                self.class(class).allowed.load(Ordering::Relaxed)
            )?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "# HELP turnstile_requests_denied Requests rejected by traffic class"
        )?;
        writeln!(out, "# TYPE turnstile_requests_denied counter")?;
        for class in TrafficClass::ALL {
            writeln!(
                out,
                "turnstile_requests_denied{{class=\"{class}\"}} {}",
                self.class(class).denied.load(Ordering::Relaxed)
            )?;
        }
        writeln!(out)?;

        let under_1ms = self.latency_under_1ms.load(Ordering::Relaxed);
        let under_10ms = under_1ms + self.latency_under_10ms.load(Ordering::Relaxed);
        let under_100ms = under_10ms + self.latency_under_100ms.load(Ordering::Relaxed);
        let under_1s = under_100ms + self.latency_under_1s.load(Ordering::Relaxed);
        let count = under_1s + self.latency_over_1s.load(Ordering::Relaxed);

        writeln!(
            out,
            "# HELP turnstile_decision_duration_seconds Admission decision latency"
        )?;
        writeln!(out, "# TYPE turnstile_decision_duration_seconds histogram")?;
        for (le, value) in [
            ("0.001", under_1ms),
            ("0.01", under_10ms),
            ("0.1", under_100ms),
            ("1", under_1s),
            ("+Inf", count),
        ] {
            writeln!(
                out,
                "turnstile_decision_duration_seconds_bucket{{le=\"{le}\"}} {value}"
            )?;
        }
        let latency_sum_seconds =
            self.latency_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        writeln!(
            out,
            "turnstile_decision_duration_seconds_sum {latency_sum_seconds:.6}"
        )?;
        writeln!(out, "turnstile_decision_duration_seconds_count {count}\n")?;

        writeln!(out, "# HELP turnstile_active_keys Number of live buckets")?;
        writeln!(out, "# TYPE turnstile_active_keys gauge")?;
        writeln!(
            out,
            "turnstile_active_keys {}\n",
            self.active_keys.load(Ordering::Relaxed)
        )?;

        writeln!(
            out,
            "# HELP turnstile_store_evictions Buckets evicted from the store by reason"
        )?;
        writeln!(out, "# TYPE turnstile_store_evictions counter")?;
        writeln!(
            out,
            "turnstile_store_evictions{{reason=\"idle\"}} {}",
            self.idle_evictions.load(Ordering::Relaxed)
        )?;
        writeln!(
            out,
            "turnstile_store_evictions{{reason=\"capacity\"}} {}",
            self.capacity_evictions.load(Ordering::Relaxed)
        )?;

        Ok(())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use turnstile::{AdmissionController, RequestContext};

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.total_decisions.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.bypassed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.auth.allowed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.public.denied.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_decision() {
        let metrics = Metrics::new();
        let controller = AdmissionController::default();
        let now = Instant::now();
        let login = RequestContext::new("/api/auth/login").with_peer_addr("10.0.0.1");

        for _ in 0..6 {
            metrics.record_decision(&controller.admit(&login, now), 50);
        }
        metrics.record_decision(&controller.admit(&RequestContext::new("/ws/feed"), now), 50);

        assert_eq!(metrics.total_decisions.load(Ordering::Relaxed), 7);
        assert_eq!(metrics.auth.allowed.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.auth.denied.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.bypassed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.api.allowed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_latency_buckets() {
        let metrics = Metrics::new();

        for latency in [500, 5000, 50000, 500000, 5000000] {
            metrics.record_decision(&Decision::Bypass, latency);
        }

        assert_eq!(metrics.latency_under_1ms.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.latency_under_10ms.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.latency_under_100ms.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.latency_under_1s.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.latency_over_1s.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record_decision(&Decision::Bypass, 10);
        metrics.update_active_keys(42);
        metrics.update_evictions(3, 1);

        let output = metrics.export_prometheus();

        assert!(output.contains("turnstile_decisions_total 1"));
        assert!(output.contains("turnstile_requests_bypassed 1"));
        assert!(output.contains("turnstile_requests_allowed{class=\"AUTH\"} 0"));
        assert!(output.contains("turnstile_requests_denied{class=\"PUBLIC\"} 0"));
        assert!(output.contains("turnstile_decision_duration_seconds_bucket{le=\"+Inf\"} 1"));
        assert!(output.contains("turnstile_active_keys 42"));
        assert!(output.contains("turnstile_store_evictions{reason=\"idle\"} 3"));
        assert!(output.contains("turnstile_store_evictions{reason=\"capacity\"} 1"));
    }
}
