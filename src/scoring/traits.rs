// Scoring adapter trait — the seam between the moderation core and the
// classifiers it consumes.
//
// Pattern matchers, ML inference services and image analysis all sit behind
// the same interface. Each adapter declares a latency class and a budget;
// callers go through `invoke_with_budget` so a slow adapter surfaces as
// `AdapterError::Timeout` instead of stalling the item.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::error::AdapterError;
use crate::models::{ChatMessage, ContentItem, ContentKind, Dimension, ScoreSet};

/// Which latency budget an adapter is rated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    /// Cheap enough for the chat path (single-digit milliseconds)
    Realtime,
    /// Network or model inference; content pipeline only
    Standard,
}

/// What an adapter is asked to score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRequest {
    pub id: String,
    pub kind: ContentKind,
    pub text: Option<String>,
    pub payload_ref: Option<String>,
    /// Requested dimensions; empty means everything the adapter offers
    pub dimensions: BTreeSet<Dimension>,
}

impl ScoringRequest {
    pub fn for_content(item: &ContentItem) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.kind,
            text: item.text.clone(),
            payload_ref: item.payload_ref.clone(),
            dimensions: BTreeSet::new(),
        }
    }

    pub fn for_chat(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            kind: ContentKind::Text,
            text: Some(message.text.clone()),
            payload_ref: None,
            dimensions: BTreeSet::new(),
        }
    }

    pub fn with_dimensions(mut self, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        self.dimensions = dimensions.into_iter().collect();
        self
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[async_trait]
pub trait ScoringAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn latency_class(&self) -> LatencyClass;

    /// Hard upper bound for a single call.
    fn budget(&self) -> Duration;

    /// Dimensions this adapter can produce.
    fn dimensions(&self) -> &[Dimension];

    fn supports(&self, _kind: ContentKind) -> bool {
        true
    }

    /// Score the request. Implementations have no side effects on
    /// moderation state.
    async fn score(&self, request: &ScoringRequest) -> Result<ScoreSet, AdapterError>;
}

/// Dimensions this adapter should answer for the given request.
pub fn requested_dimensions(adapter: &dyn ScoringAdapter, request: &ScoringRequest) -> BTreeSet<Dimension> {
    adapter
        .dimensions()
        .iter()
        .filter(|d| request.dimensions.is_empty() || request.dimensions.contains(*d))
        .cloned()
        .collect()
}

/// Call `adapter` under `budget`.
///
/// The returned set always carries the measured latency, and any requested
/// dimension the adapter neither scored nor marked missing is added to
/// `missing`, so partial answers never pass as complete ones.
pub async fn invoke_with_budget(
    adapter: &dyn ScoringAdapter,
    request: &ScoringRequest,
    budget: Duration,
) -> Result<ScoreSet, AdapterError> {
    let started = Instant::now();
    let outcome = tokio::time::timeout(budget, adapter.score(request)).await;
    let latency = started.elapsed();

    match outcome {
        Ok(Ok(mut set)) => {
            for dimension in requested_dimensions(adapter, request) {
                if !set.scores.contains_key(&dimension) {
                    set.missing.insert(dimension);
                }
            }
            set.latency = latency;
            debug!(
                adapter = adapter.name(),
                item = %request.id,
                latency_us = latency.as_micros() as u64,
                missing = set.missing.len(),
                "Adapter scored"
            );
            Ok(set)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(AdapterError::Timeout {
            adapter: adapter.name().to_string(),
            budget,
        }),
    }
}

/// `invoke_with_budget`, turning failures into a degraded set. The error is
/// handed back so the caller can report adapter health.
pub async fn invoke_or_degrade(
    adapter: &dyn ScoringAdapter,
    request: &ScoringRequest,
    budget: Duration,
) -> (ScoreSet, Option<AdapterError>) {
    let started = Instant::now();
    match invoke_with_budget(adapter, request, budget).await {
        Ok(set) => (set, None),
        Err(e) => {
            let dimensions = requested_dimensions(adapter, request);
            let degraded = ScoreSet::degraded(adapter.name(), &dimensions, started.elapsed());
            (degraded, Some(e))
        }
    }
}
