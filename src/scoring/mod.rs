// Scoring — adapters that turn content into per-dimension probabilities,
// and the risk model that folds those into one combined score.
//
// Adapters are opaque classifiers behind the ScoringAdapter trait. The
// lexicon and heuristic scorers are cheap enough for the chat path; the HTTP
// adapter fronts a remote model for the content pipeline.

pub mod heuristics;
pub mod http;
pub mod lexicon;
pub mod rate_limiter;
pub mod risk;
pub mod traits;

pub use heuristics::HeuristicSpamScorer;
pub use http::HttpModelAdapter;
pub use lexicon::{LexiconScorer, PhraseList};
pub use rate_limiter::RateLimiter;
pub use risk::{Assessment, CombineStrategy, RiskModel, ViolationThresholds};
pub use traits::{invoke_or_degrade, invoke_with_budget, LatencyClass, ScoringAdapter, ScoringRequest};
