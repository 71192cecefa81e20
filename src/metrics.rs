//! Engine observability: latency histograms and event counters.
//! Histograms track p50/p95/p99 over a bounded sample ring.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Fixed-capacity ring buffer for histogram samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
        }
    }

    fn push(&mut self, value: f64) {
        let capacity = self.samples.len();
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        sorted[idx.min(self.count - 1)]
    }
}

/// Histograms and counters keyed by well-known metric names.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    counters: Mutex<HashMap<&'static str, u64>>,
    ring_capacity: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            ring_capacity: 1024,
        }
    }

    /// Record a sample (in microseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_us: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value_us);
        tracing::trace!(metric = name, value_us, "metric_recorded");
    }

    pub fn incr(&self, name: &'static str) {
        *self.counters.lock().entry(name).or_insert(0) += 1;
    }

    pub fn count(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Get percentile for a metric (p value 0-100). Returns microseconds.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        self.histograms
            .lock()
            .get(name)
            .map(|ring| ring.percentile(p))
            .unwrap_or(0.0)
    }

    /// Snapshot of every histogram and counter.
    pub fn summary(&self) -> MetricsSnapshot {
        let histograms = self
            .histograms
            .lock()
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_us: ring.percentile(50.0),
                        p95_us: ring.percentile(95.0),
                        p99_us: ring.percentile(99.0),
                        count: ring.count,
                    },
                )
            })
            .collect();
        let counters = self
            .counters
            .lock()
            .iter()
            .map(|(&name, &n)| (name.to_string(), n))
            .collect();
        MetricsSnapshot { histograms, counters }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub histograms: HashMap<String, MetricSummary>,
    pub counters: HashMap<String, u64>,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const TRANSLATE_DONE: &str = "t_translate_done";
    pub const ATTEMPT_FAILED: &str = "translate_attempt_failed";
    pub const TRANSLATE_EXHAUSTED: &str = "translate_exhausted";
    pub const CACHE_HIT: &str = "cache_hit";
    pub const DEDUP_JOIN: &str = "dedup_join";
    pub const NETWORK_FETCH: &str = "network_fetch";
    pub const SUPERSEDED: &str = "result_superseded";
    pub const ORPHANED: &str = "result_orphaned";
    pub const HOVER_STALE: &str = "hover_stale";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_over_samples() {
        let m = MetricsRegistry::new();
        for v in 1..=100 {
            m.record(metric_names::TRANSLATE_DONE, v as f64);
        }
        assert_eq!(m.percentile(metric_names::TRANSLATE_DONE, 50.0), 51.0);
        assert_eq!(m.percentile(metric_names::TRANSLATE_DONE, 99.0), 99.0);
        assert_eq!(m.percentile("missing", 50.0), 0.0);
    }

    #[test]
    fn counters_show_in_summary() {
        let m = MetricsRegistry::new();
        m.incr(metric_names::CACHE_HIT);
        m.incr(metric_names::CACHE_HIT);
        assert_eq!(m.count(metric_names::CACHE_HIT), 2);
        let snap = m.summary();
        assert_eq!(snap.counters.get(metric_names::CACHE_HIT), Some(&2));
    }
}
