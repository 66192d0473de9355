// Shared test doubles: a scriptable scoring adapter and a sink that fails
// on demand.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sentinel::error::{AdapterError, SinkError};
use sentinel::models::{ChatMessage, ContentKind, Decision, Dimension, RealtimeDecision, ReputationRecord, ReviewTask, ScoreSet};
use sentinel::scoring::traits::requested_dimensions;
use sentinel::scoring::{LatencyClass, ScoringAdapter, ScoringRequest};
use sentinel::sink::{DecisionSink, MemorySink};

/// Adapter that returns fixed scores after a fixed delay.
pub struct StubAdapter {
    name: String,
    class: LatencyClass,
    dimensions: Vec<Dimension>,
    scores: BTreeMap<Dimension, f64>,
    flags: Vec<String>,
    confidence: f64,
    delay: Duration,
    budget: Duration,
    unavailable: bool,
    kinds: Option<Vec<ContentKind>>,
    calls: AtomicUsize,
}

impl StubAdapter {
    pub fn new(name: &str, class: LatencyClass) -> Self {
        Self {
            name: name.to_string(),
            class,
            dimensions: Vec::new(),
            scores: BTreeMap::new(),
            flags: Vec::new(),
            confidence: 0.9,
            delay: Duration::ZERO,
            budget: Duration::from_millis(500),
            unavailable: false,
            kinds: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Standard-class adapter scoring the given dimensions.
    pub fn scoring(name: &str, scores: &[(Dimension, f64)]) -> Self {
        let mut stub = Self::new(name, LatencyClass::Standard);
        for (d, v) in scores {
            stub = stub.with_score(d.clone(), *v);
        }
        stub
    }

    pub fn with_score(mut self, dimension: Dimension, value: f64) -> Self {
        if !self.dimensions.contains(&dimension) {
            self.dimensions.push(dimension.clone());
        }
        self.scores.insert(dimension, value);
        self
    }

    /// Declare a dimension the adapter offers but never answers.
    pub fn with_silent_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.flags.push(flag.to_string());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Restrict the adapter to the given content kinds.
    pub fn only(mut self, kinds: &[ContentKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn latency_class(&self) -> LatencyClass {
        self.class
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    fn supports(&self, kind: ContentKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreSet, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unavailable {
            return Err(AdapterError::Unavailable {
                adapter: self.name.clone(),
                reason: "connection refused".to_string(),
            });
        }

        let wanted = requested_dimensions(self, request);
        let mut set = ScoreSet::new(self.name.as_str()).with_confidence(self.confidence);
        for (dimension, value) in &self.scores {
            if wanted.contains(dimension) {
                set.insert(dimension.clone(), *value);
            }
        }
        for flag in &self.flags {
            set.flags.insert(flag.clone());
        }
        Ok(set)
    }
}

/// MemorySink whose decision writes fail while `failures` is above zero.
#[derive(Default)]
pub struct FlakySink {
    pub inner: MemorySink,
    failures: AtomicUsize,
}

impl FlakySink {
    pub fn failing(times: usize) -> Self {
        Self {
            inner: MemorySink::new(),
            failures: AtomicUsize::new(times),
        }
    }

    fn trip(&self) -> Result<(), SinkError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(SinkError::Unavailable("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DecisionSink for FlakySink {
    async fn write_decision(&self, decision: &Decision) -> Result<(), SinkError> {
        self.trip()?;
        self.inner.write_decision(decision).await
    }

    async fn write_realtime_decision(&self, decision: &RealtimeDecision) -> Result<(), SinkError> {
        self.inner.write_realtime_decision(decision).await
    }

    async fn write_review_task(&self, task: &ReviewTask) -> Result<(), SinkError> {
        self.inner.write_review_task(task).await
    }

    async fn write_reputation(&self, record: &ReputationRecord) -> Result<(), SinkError> {
        self.inner.write_reputation(record).await
    }

    async fn write_chat_review(&self, message: &ChatMessage) -> Result<(), SinkError> {
        self.inner.write_chat_review(message).await
    }
}
