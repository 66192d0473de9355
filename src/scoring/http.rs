// Remote model adapter — scores content through an HTTP inference endpoint.
//
// The endpoint receives `{id, kind, text, payload_ref, dimensions}` and
// answers `{scores: {dimension: p}, confidence, flags}`. Requests are paced
// by a RateLimiter so a hosted endpoint's QPS cap is respected. Network and
// decoding failures become AdapterError::Unavailable; the caller's budget
// turns slowness into a timeout.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AdapterError;
use crate::models::{ContentKind, Dimension, ScoreSet};

use super::rate_limiter::RateLimiter;
use super::traits::{requested_dimensions, LatencyClass, ScoringAdapter, ScoringRequest};

pub struct HttpModelAdapter {
    name: String,
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    dimensions: Vec<Dimension>,
    kinds: Vec<ContentKind>,
    budget: Duration,
    rate_limiter: RateLimiter,
}

impl HttpModelAdapter {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, dimensions: Vec<Dimension>) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
            dimensions,
            kinds: vec![ContentKind::Text, ContentKind::Profile, ContentKind::Image],
            budget: Duration::from_millis(400),
            rate_limiter: RateLimiter::new(10.0),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_qps(mut self, qps: f64) -> Self {
        self.rate_limiter = RateLimiter::new(qps);
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<ContentKind>) -> Self {
        self.kinds = kinds;
        self
    }

    async fn call(&self, request: &ScoringRequest, dimensions: &BTreeSet<Dimension>) -> Result<ModelResponse> {
        self.rate_limiter.acquire().await;

        let body = ModelRequest {
            id: &request.id,
            kind: request.kind,
            text: request.text.as_deref(),
            payload_ref: request.payload_ref.as_deref(),
            dimensions: dimensions.iter().map(Dimension::as_str).collect(),
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach model endpoint {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Model endpoint returned {}: {}", status, text);
        }

        response
            .json::<ModelResponse>()
            .await
            .context("Failed to parse model endpoint response")
    }
}

#[async_trait]
impl ScoringAdapter for HttpModelAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Standard
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    fn supports(&self, kind: ContentKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreSet, AdapterError> {
        let dimensions = requested_dimensions(self, request);
        let response = self
            .call(request, &dimensions)
            .await
            .map_err(|e| AdapterError::Unavailable {
                adapter: self.name.clone(),
                reason: format!("{e:#}"),
            })?;

        debug!(
            adapter = %self.name,
            item = %request.id,
            returned = response.scores.len(),
            confidence = response.confidence,
            "Model endpoint answered"
        );

        let mut set = ScoreSet::new(self.name.as_str()).with_confidence(response.confidence);
        for (name, value) in response.scores {
            let dimension = Dimension::new(name);
            if dimensions.contains(&dimension) {
                set.insert(dimension, value);
            }
        }
        set.flags.extend(response.flags);
        Ok(set)
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct ModelRequest<'a> {
    id: &'a str,
    kind: ContentKind,
    text: Option<&'a str>,
    payload_ref: Option<&'a str>,
    dimensions: Vec<&'a str>,
}

#[derive(Deserialize)]
struct ModelResponse {
    #[serde(default)]
    scores: BTreeMap<String, f64>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    flags: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_defaults_fill_missing_fields() {
        let parsed: ModelResponse = serde_json::from_str(r#"{"scores": {"toxicity": 0.4}}"#).unwrap();
        assert_eq!(parsed.scores["toxicity"], 0.4);
        assert_eq!(parsed.confidence, 1.0);
        assert!(parsed.flags.is_empty());
    }

    #[test]
    fn request_serializes_snake_case_kind() {
        let body = ModelRequest {
            id: "c1",
            kind: ContentKind::Image,
            text: None,
            payload_ref: Some("s3://bucket/img.png"),
            dimensions: vec!["adult_content"],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["dimensions"][0], "adult_content");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let adapter = HttpModelAdapter::new("remote", "http://127.0.0.1:9/score", vec![Dimension::TOXICITY])
            .with_qps(0.0);
        let request = ScoringRequest {
            id: "c1".into(),
            kind: ContentKind::Text,
            text: Some("hi".into()),
            payload_ref: None,
            dimensions: BTreeSet::new(),
        };
        let err = adapter.score(&request).await.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.adapter(), "remote");
    }
}
