//! Performance metrics and statistics tracking for the prediction pipeline.

use crate::types::prediction::{Label, PredictionResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Total predictions served
    predictions_processed: AtomicU64,
    /// Predictions labelled "yes"
    accepted: AtomicU64,
    /// Failed requests by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Unseen categorical values by column
    unseen_by_column: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            predictions_processed: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            unseen_by_column: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a served prediction
    pub fn record_prediction(&self, processing_time: Duration, result: &PredictionResult) {
        self.predictions_processed.fetch_add(1, Ordering::Relaxed);
        if result.label == Label::Accept {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (result.probability.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, kind: &str) {
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a categorical value that fell back to its default code
    pub fn record_unseen_category(&self, column: &str) {
        if let Ok(mut by_column) = self.unseen_by_column.write() {
            *by_column.entry(column.to_string()).or_insert(0) += 1;
        }
    }

    pub fn predictions_processed(&self) -> u64 {
        self.predictions_processed.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn unseen_by_column(&self) -> HashMap<String, u64> {
        self.unseen_by_column
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (predictions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions_processed() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get probability distribution
    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            predictions_processed: self.predictions_processed(),
            accepted: self.accepted(),
            failures_by_kind: self.failures_by_kind(),
            unseen_by_column: self.unseen_by_column(),
            processing: self.get_processing_stats(),
            throughput_per_sec: self.get_throughput(),
            probability_distribution: self.get_probability_distribution(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let count = self.predictions_processed();
        let accepted = self.accepted();
        let accept_rate = if count > 0 {
            (accepted as f64 / count as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let failures = self.failures_by_kind();
        let unseen = self.unseen_by_column();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║         DEPOSIT PREDICTION PIPELINE - METRICS SUMMARY        ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions Served:     {:>8}  │  Throughput: {:>6.1} req/s ║",
            count, throughput
        );
        info!(
            "║ Predicted \"yes\":        {:>8}  │  Accept Rate: {:>6.1}%    ║",
            accepted, accept_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        if !failures.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, n) in &failures {
                info!("║   {:24}: {:>6}                           ║", kind, n);
            }
        }
        if !unseen.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Unseen Categories by Column:                                 ║");
            for (column, n) in &unseen {
                info!("║   {:12}: {:>6}                                       ║", column, n);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Probability Distribution:                                    ║");
        let total: u64 = distribution.iter().sum();
        for (i, &n) in distribution.iter().enumerate() {
            let pct = if total > 0 { (n as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                n,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view served by the pipeline metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub predictions_processed: u64,
    pub accepted: u64,
    pub failures_by_kind: HashMap<String, u64>,
    pub unseen_by_column: HashMap<String, u64>,
    pub processing: ProcessingStats,
    pub throughput_per_sec: f64,
    pub probability_distribution: [u64; 10],
    pub uptime_secs: u64,
}

/// Periodic reporter that logs metric summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task. Returns immediately when the interval is 0.
    pub async fn start(self) {
        if self.interval_secs == 0 {
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_prediction(Duration::from_micros(100), &PredictionResult::new(Label::Accept, 0.65, true));
        metrics.record_prediction(Duration::from_micros(300), &PredictionResult::new(Label::Decline, 0.1, true));
        metrics.record_prediction(Duration::from_micros(200), &PredictionResult::new(Label::Accept, 1.0, false));

        assert_eq!(metrics.predictions_processed(), 3);
        assert_eq!(metrics.accepted(), 2);

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean_us, 200);
        assert_eq!(stats.max_us, 300);

        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[1], 1);
        assert_eq!(distribution[6], 1);
        assert_eq!(distribution[9], 1);
    }

    #[test]
    fn test_failures_and_unseen_counts() {
        let metrics = PipelineMetrics::new();
        metrics.record_failure("store_unavailable");
        metrics.record_failure("store_unavailable");
        metrics.record_failure("invalid_input");
        metrics.record_unseen_category("job");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.predictions_processed, 0);
        assert_eq!(snapshot.failures_by_kind.get("store_unavailable"), Some(&2));
        assert_eq!(snapshot.failures_by_kind.get("invalid_input"), Some(&1));
        assert_eq!(snapshot.unseen_by_column.get("job"), Some(&1));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["probability_distribution"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_reporter_disabled_returns() {
        let reporter = MetricsReporter::new(Arc::new(PipelineMetrics::new()), 0);
        reporter.start().await;
    }
}
