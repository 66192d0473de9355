// Synthetic content traffic for `sentinel simulate-content`.
//
// Items are drawn from a weighted scenario mix with a seeded RNG, so a run
// with the same seed produces the same items. `SimulatedModel` stands in
// for an external inference service: its scores come from the lexicon and
// spam heuristics, and its latency (including the occasional timeout) is
// derived from the item id.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::error::AdapterError;
use crate::models::{ContentItem, ContentKind, Dimension, ScoreSet};
use crate::scoring::heuristics::HeuristicSpamScorer;
use crate::scoring::lexicon::LexiconScorer;
use crate::scoring::traits::requested_dimensions;
use crate::scoring::{LatencyClass, ScoringAdapter, ScoringRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scenario {
    Clean,
    Borderline,
    Spam,
    Toxic,
    Critical,
    Duplicate,
    Profile,
    Image,
}

impl Scenario {
    pub const ALL: [Scenario; 8] = [
        Scenario::Clean,
        Scenario::Borderline,
        Scenario::Spam,
        Scenario::Toxic,
        Scenario::Critical,
        Scenario::Duplicate,
        Scenario::Profile,
        Scenario::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Clean => "clean",
            Scenario::Borderline => "borderline",
            Scenario::Spam => "spam",
            Scenario::Toxic => "toxic",
            Scenario::Critical => "critical",
            Scenario::Duplicate => "duplicate",
            Scenario::Profile => "profile",
            Scenario::Image => "image",
        }
    }

    /// Share of generated traffic, in percent.
    fn weight(&self) -> u32 {
        match self {
            Scenario::Clean => 52,
            Scenario::Borderline => 8,
            Scenario::Spam => 12,
            Scenario::Toxic => 10,
            Scenario::Critical => 3,
            Scenario::Duplicate => 6,
            Scenario::Profile => 4,
            Scenario::Image => 5,
        }
    }
}

const TOPICS: &[&str] = &["the new patch", "ranked mode", "the tournament", "crafting", "the soundtrack"];
const OPINIONS: &[&str] = &[
    "it needs a few tweaks",
    "it is the best update in years",
    "the balance feels off",
    "the devs listened this time",
];

const CLEAN: &[&str] = &[
    "Hey everyone, just wanted to share my thoughts on {topic}. I think {opinion}.",
    "Has anyone tried {topic}? Curious what people think.",
    "Great discussion here! I agree with the point about {topic}.",
    "Thanks for the help, that solved my problem with {topic}.",
    "Looking forward to {topic}. Who else is excited?",
];

const BORDERLINE: &[&str] = &[
    "That was a dumb play, you should practice more.",
    "Honestly this take on {topic} is pretty stupid.",
    "Shut up about {topic} already, wtf.",
    "Your strategy is trash, maybe this game isn't for you.",
];

const SPAM: &[&str] = &[
    "BUY NOW!!! Cheap pills at http://deals{n}.example.com 90% OFF!!!",
    "Click here to win cash http://prize{n}.example.net http://prize{n}.example.org http://x{n}.example.io",
    "Make $500 per day from home! Visit http://work{n}.example.com NOW!!!!!",
    "FREE MONEY!!!!! LIMITED TIME!!!!! http://free{n}.example.com",
];

const TOXIC: &[&str] = &[
    "You're such a worthless idiot, nobody likes you.",
    "Everyone hates you, you pathetic moron. Go away.",
    "Shut up you stupid loser, you suck at {topic}.",
    "Subhuman vermin like you should go back to your country.",
];

const CRITICAL: &[&str] = &[
    "I know where you live and I'm going to hurt you.",
    "Kill yourself, nobody would miss you.",
    "Want real engagement? buy followers here: http://growth{n}.example.com",
];

const PROFILES: &[&str] = &[
    "Casual gamer from the coast. Love strategy games!",
    "Competitive player, always looking to improve.",
    "18+ only. DM me for adult content, send nudes.",
    "Just here to have fun! GG to all.",
];

const IMAGES: &[&str] = &[
    "https://cdn.example.com/uploads/gameplay-{n}.png",
    "https://cdn.example.com/uploads/avatar-{n}.jpg",
    "https://cdn.example.com/uploads/fanart-{n}.png",
    "https://cdn.example.com/uploads/nsfw-{n}.jpg",
    "https://cdn.example.com/uploads/weapon-{n}.jpg",
];

pub struct ContentGenerator {
    rng: StdRng,
    authors: Vec<String>,
    sequence: u64,
    recent_spam: Vec<String>,
    start: DateTime<Utc>,
}

impl ContentGenerator {
    pub fn new(seed: u64, authors: usize, start: DateTime<Utc>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            authors: (0..authors.max(1)).map(|i| format!("user-{i:04}")).collect(),
            sequence: 0,
            recent_spam: Vec::new(),
            start,
        }
    }

    fn pick(&mut self, templates: &[&str]) -> String {
        let template = templates.choose(&mut self.rng).copied().unwrap_or_default();
        let topic = TOPICS.choose(&mut self.rng).copied().unwrap_or_default();
        let opinion = OPINIONS.choose(&mut self.rng).copied().unwrap_or_default();
        template
            .replace("{topic}", topic)
            .replace("{opinion}", opinion)
            .replace("{n}", &self.rng.random_range(100..999).to_string())
    }

    fn scenario(&mut self) -> Scenario {
        let total: u32 = Scenario::ALL.iter().map(|s| s.weight()).sum();
        let mut roll = self.rng.random_range(0..total);
        for scenario in Scenario::ALL {
            if roll < scenario.weight() {
                return scenario;
            }
            roll -= scenario.weight();
        }
        Scenario::Clean
    }

    /// Next item and the scenario it was drawn from.
    pub fn next_item(&mut self) -> (Scenario, ContentItem) {
        self.sequence += 1;
        let id = format!("content-{:06}", self.sequence);
        let author = self
            .authors
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| "user-0000".to_string());
        // Spread submissions over time so per-author rates stay realistic.
        let at = self.start + chrono::Duration::milliseconds(self.sequence as i64 * 250);

        let mut scenario = self.scenario();
        if scenario == Scenario::Duplicate && self.recent_spam.is_empty() {
            scenario = Scenario::Spam;
        }

        let item = match scenario {
            Scenario::Image => {
                let url = self.pick(IMAGES);
                ContentItem::image(id, author, url)
            }
            Scenario::Profile => {
                let mut item = ContentItem::text(id, author, self.pick(PROFILES));
                item.kind = ContentKind::Profile;
                item
            }
            Scenario::Duplicate => {
                let text = self
                    .recent_spam
                    .choose(&mut self.rng)
                    .cloned()
                    .unwrap_or_default();
                ContentItem::text(id, author, text)
            }
            other => {
                let templates = match other {
                    Scenario::Borderline => BORDERLINE,
                    Scenario::Spam => SPAM,
                    Scenario::Toxic => TOXIC,
                    Scenario::Critical => CRITICAL,
                    _ => CLEAN,
                };
                let text = self.pick(templates);
                if other == Scenario::Spam {
                    self.recent_spam.push(text.clone());
                    if self.recent_spam.len() > 16 {
                        self.recent_spam.remove(0);
                    }
                }
                ContentItem::text(id, author, text)
            }
        };

        (scenario, item.submitted_at(at).with_channel("forum"))
    }

    pub fn generate(&mut self, count: usize) -> Vec<(Scenario, ContentItem)> {
        (0..count).map(|_| self.next_item()).collect()
    }
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Stand-in for a remote classification model.
pub struct SimulatedModel {
    lexicon: LexiconScorer,
    spam: HeuristicSpamScorer,
    dimensions: Vec<Dimension>,
    budget: Duration,
    min_latency_ms: u64,
    max_latency_ms: u64,
    /// Fraction of calls (in thousandths) that overrun the budget
    timeout_per_mille: u64,
}

impl Default for SimulatedModel {
    fn default() -> Self {
        Self {
            lexicon: LexiconScorer::default(),
            spam: HeuristicSpamScorer::default(),
            dimensions: vec![
                Dimension::TOXICITY,
                Dimension::HATE_SPEECH,
                Dimension::HARASSMENT,
                Dimension::VIOLENCE,
                Dimension::ADULT_CONTENT,
                Dimension::SPAM,
            ],
            budget: Duration::from_millis(400),
            min_latency_ms: 15,
            max_latency_ms: 120,
            timeout_per_mille: 20,
        }
    }
}

impl SimulatedModel {
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_latency_ms = min_ms;
        self.max_latency_ms = max_ms.max(min_ms);
        self
    }

    pub fn with_timeout_rate(mut self, rate: f64) -> Self {
        self.timeout_per_mille = (rate.clamp(0.0, 1.0) * 1000.0) as u64;
        self
    }

    fn latency_for(&self, id: &str) -> Duration {
        let h = stable_hash(id);
        if h % 1000 < self.timeout_per_mille {
            return self.budget + Duration::from_millis(50);
        }
        let spread = self.max_latency_ms - self.min_latency_ms + 1;
        Duration::from_millis(self.min_latency_ms + (h >> 10) % spread)
    }

    fn score_image(&self, payload: &str, set: &mut ScoreSet) {
        let payload = payload.to_lowercase();
        if payload.contains("nsfw") {
            set.insert(Dimension::ADULT_CONTENT, 0.92);
            set.flags.insert("explicit_content".to_string());
        }
        if payload.contains("weapon") {
            set.insert(Dimension::VIOLENCE, 0.55);
            set.flags.insert("weapons_detected".to_string());
        }
    }
}

#[async_trait]
impl ScoringAdapter for SimulatedModel {
    fn name(&self) -> &str {
        "simulated_model"
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

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreSet, AdapterError> {
        tokio::time::sleep(self.latency_for(&request.id)).await;

        let wanted = requested_dimensions(self, request);
        let mut set = ScoreSet::new(self.name());
        for dimension in &wanted {
            set.insert(dimension.clone(), 0.02);
        }

        let text = request.text_or_empty();
        for (dimension, score) in self.lexicon.score_text(text) {
            if wanted.contains(&dimension) {
                set.insert(dimension, score);
            }
        }
        if wanted.contains(&Dimension::SPAM) {
            set.insert(Dimension::SPAM, self.spam.spam_score(text));
        }
        if text.to_lowercase().contains("adult content") {
            set.insert(Dimension::ADULT_CONTENT, 0.8);
        }
        if let Some(payload) = &request.payload_ref {
            self.score_image(payload, &mut set);
        }

        // One call in ten comes back unsure of itself.
        let confidence = if stable_hash(&request.id) % 10 == 0 {
            0.45
        } else {
            0.9
        };
        Ok(set.with_confidence(confidence))
    }
}
