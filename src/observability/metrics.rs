// Execution metrics
//
// Counters, a gauge and a latency histogram for:
// - Execution outcomes (succeeded, failed, timed out)
// - Requests rejected before execution (validation, admission)
// - Infrastructure errors
// - Units currently in flight
//
// One registry per engine; the server exposes it in Prometheus text format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::types::ExecutionStatus;

/// Counter metric (monotonically increasing)
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge metric (can go up or down)
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturating: a stray dec must not wrap to u64::MAX.
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct HistogramBucket {
    pub le: f64, // upper bound in seconds
    pub count: AtomicU64,
}

/// Histogram metric for latency/duration tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum: AtomicU64, // microseconds
    count: AtomicU64,
}

impl Histogram {
    /// Standard latency buckets (seconds), topping out above the largest
    /// sensible execution budget.
    pub fn new_latency() -> Self {
        let bucket_bounds = [
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ];

        Self {
            buckets: bucket_bounds
                .into_iter()
                .map(|le| HistogramBucket {
                    le,
                    count: AtomicU64::new(0),
                })
                .collect(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let seconds = value.as_secs_f64();
        self.sum
            .fetch_add(value.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for bucket in &self.buckets {
            if seconds <= bucket.le {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn get_bucket_count(&self, le: f64) -> u64 {
        self.buckets
            .iter()
            .find(|b| (b.le - le).abs() < 0.0001)
            .map(|b| b.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Metrics of one execution engine
#[derive(Debug)]
pub struct EngineMetrics {
    pub executions_total: Counter,
    pub executions_succeeded: Counter,
    /// Compile and runtime faults
    pub executions_failed: Counter,
    pub executions_timed_out: Counter,

    pub validation_rejections: Counter,
    pub admission_rejections: Counter,
    pub infrastructure_errors: Counter,

    pub units_in_flight: Gauge,

    pub execution_duration: Histogram,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            executions_total: Counter::new(),
            executions_succeeded: Counter::new(),
            executions_failed: Counter::new(),
            executions_timed_out: Counter::new(),
            validation_rejections: Counter::new(),
            admission_rejections: Counter::new(),
            infrastructure_errors: Counter::new(),
            units_in_flight: Gauge::new(),
            execution_duration: Histogram::new_latency(),
        }
    }

    /// Record a finished execution
    pub fn record_execution(&self, status: ExecutionStatus, wall_time: Duration) {
        self.executions_total.inc();
        match status {
            ExecutionStatus::Ok => self.executions_succeeded.inc(),
            ExecutionStatus::TimeLimit => self.executions_timed_out.inc(),
            ExecutionStatus::CompileError | ExecutionStatus::RuntimeError => {
                self.executions_failed.inc()
            }
        }
        self.execution_duration.observe(wall_time);
    }

    /// Export metrics in Prometheus text format
    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        write_counter(
            &mut output,
            "snipbox_executions_total",
            "Executions that produced a result",
            self.executions_total.get(),
        );

        output.push_str("# HELP snipbox_executions_by_outcome Executions by outcome\n");
        output.push_str("# TYPE snipbox_executions_by_outcome counter\n");
        for (outcome, counter) in [
            ("succeeded", &self.executions_succeeded),
            ("failed", &self.executions_failed),
            ("timed_out", &self.executions_timed_out),
        ] {
            let _ = writeln!(
                output,
                "snipbox_executions_by_outcome{{outcome=\"{}\"}} {}",
                outcome,
                counter.get()
            );
        }

        write_counter(
            &mut output,
            "snipbox_validation_rejections_total",
            "Requests rejected by validation",
            self.validation_rejections.get(),
        );
        write_counter(
            &mut output,
            "snipbox_admission_rejections_total",
            "Requests rejected because capacity was exhausted",
            self.admission_rejections.get(),
        );
        write_counter(
            &mut output,
            "snipbox_infrastructure_errors_total",
            "Requests that failed for reasons unrelated to the submitted code",
            self.infrastructure_errors.get(),
        );

        output.push_str("# HELP snipbox_units_in_flight Execution units currently alive\n");
        output.push_str("# TYPE snipbox_units_in_flight gauge\n");
        let _ = writeln!(output, "snipbox_units_in_flight {}", self.units_in_flight.get());

        output.push_str(
            "# HELP snipbox_execution_duration_seconds Wall time from spawn to reap\n",
        );
        output.push_str("# TYPE snipbox_execution_duration_seconds histogram\n");
        for bucket in &self.execution_duration.buckets {
            let _ = writeln!(
                output,
                "snipbox_execution_duration_seconds_bucket{{le=\"{}\"}} {}",
                bucket.le,
                bucket.count.load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(
            output,
            "snipbox_execution_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            self.execution_duration.get_count()
        );
        let _ = writeln!(
            output,
            "snipbox_execution_duration_seconds_sum {}",
            self.execution_duration.get_sum_micros() as f64 / 1_000_000.0
        );
        let _ = writeln!(
            output,
            "snipbox_execution_duration_seconds_count {}",
            self.execution_duration.get_count()
        );

        output
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn write_counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} counter", name);
    let _ = writeln!(output, "{} {}", name, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_gauge() {
        let counter = Counter::new();
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);

        let gauge = Gauge::new();
        gauge.inc();
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.get(), 1);
        gauge.dec();
        gauge.dec();
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let histogram = Histogram::new_latency();
        histogram.observe(Duration::from_millis(3));
        histogram.observe(Duration::from_millis(40));
        histogram.observe(Duration::from_secs(5));

        assert_eq!(histogram.get_count(), 3);
        assert_eq!(histogram.get_bucket_count(0.005), 1);
        assert_eq!(histogram.get_bucket_count(0.05), 2);
        assert_eq!(histogram.get_bucket_count(5.0), 3);
        assert_eq!(histogram.get_sum_micros(), 5_043_000);
    }

    #[test]
    fn test_record_execution_by_status() {
        let metrics = EngineMetrics::new();
        metrics.record_execution(ExecutionStatus::Ok, Duration::from_millis(20));
        metrics.record_execution(ExecutionStatus::RuntimeError, Duration::from_millis(20));
        metrics.record_execution(ExecutionStatus::CompileError, Duration::from_millis(20));
        metrics.record_execution(ExecutionStatus::TimeLimit, Duration::from_secs(5));

        assert_eq!(metrics.executions_total.get(), 4);
        assert_eq!(metrics.executions_succeeded.get(), 1);
        assert_eq!(metrics.executions_failed.get(), 2);
        assert_eq!(metrics.executions_timed_out.get(), 1);
        assert_eq!(metrics.execution_duration.get_count(), 4);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = EngineMetrics::new();
        metrics.record_execution(ExecutionStatus::Ok, Duration::from_millis(20));
        metrics.validation_rejections.inc();
        for _ in 0..3 {
            metrics.units_in_flight.inc();
        }

        let text = metrics.render_prometheus();
        assert!(text.contains("snipbox_executions_total 1"));
        assert!(text.contains("snipbox_executions_by_outcome{outcome=\"succeeded\"} 1"));
        assert!(text.contains("snipbox_validation_rejections_total 1"));
        assert!(text.contains("snipbox_units_in_flight 3"));
        assert!(text.contains("snipbox_execution_duration_seconds_bucket{le=\"+Inf\"} 1"));
        assert!(text.contains("# TYPE snipbox_execution_duration_seconds histogram"));
    }
}
