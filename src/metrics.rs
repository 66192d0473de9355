// Metrics push interface.
//
// Every stage reports counters and latency observations through MetricsSink.
// The export format belongs to whoever implements the trait; InMemoryMetrics
// keeps everything in process for tests and the simulate commands.

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;

pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &str, labels: &[(&str, &str)], n: u64);
    fn observe(&self, name: &str, labels: &[(&str, &str)], value: Duration);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr(&self, _name: &str, _labels: &[(&str, &str)], _n: u64) {}
    fn observe(&self, _name: &str, _labels: &[(&str, &str)], _value: Duration) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    pub count: usize,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

/// Samples kept per histogram before the oldest half is dropped.
const MAX_SAMPLES: usize = 200_000;

#[derive(Default)]
pub struct InMemoryMetrics {
    counters: DashMap<String, u64>,
    histograms: DashMap<String, Mutex<Vec<Duration>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter value for an exact name + label set.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters.get(&series_key(name, labels)).map_or(0, |v| *v)
    }

    /// Sum of a counter across every label set.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|e| series_name(e.key()) == name)
            .map(|e| *e.value())
            .sum()
    }

    /// All counter series, sorted by key.
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// p50/p95/p99 over every series sharing `name`. None without samples.
    pub fn percentiles(&self, name: &str) -> Option<Percentiles> {
        let mut samples: Vec<Duration> = Vec::new();
        for entry in self.histograms.iter() {
            if series_name(entry.key()) == name {
                samples.extend(entry.value().lock().iter().copied());
            }
        }
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        Some(Percentiles {
            count: samples.len(),
            p50: nearest_rank(&samples, 0.50),
            p95: nearest_rank(&samples, 0.95),
            p99: nearest_rank(&samples, 0.99),
            max: samples[samples.len() - 1],
        })
    }
}

impl MetricsSink for InMemoryMetrics {
    fn incr(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        *self.counters.entry(series_key(name, labels)).or_insert(0) += n;
    }

    fn observe(&self, name: &str, labels: &[(&str, &str)], value: Duration) {
        let key = series_key(name, labels);
        let series = self.histograms.entry(key).or_default();
        let mut samples = series.lock();
        if samples.len() >= MAX_SAMPLES {
            samples.drain(..MAX_SAMPLES / 2);
        }
        samples.push(value);
    }
}

/// `name{a=1,b=2}` with labels sorted so call-site order doesn't matter.
fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut sorted: Vec<_> = labels.to_vec();
    sorted.sort_unstable();
    let rendered: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}

fn series_name(key: &str) -> &str {
    key.split('{').next().unwrap_or(key)
}

fn nearest_rank(sorted: &[Duration], q: f64) -> Duration {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
