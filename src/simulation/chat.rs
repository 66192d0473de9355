// Synthetic chat traffic for `sentinel simulate-chat`.
//
// Messages arrive at a steady rate across a handful of channels. Some
// authors are toxic or spammy, and an optional raid floods one channel
// with a single message from many fresh accounts inside about a second.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::models::ChatMessage;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub channels: usize,
    pub users: usize,
    pub messages: usize,
    pub messages_per_sec: f64,
    /// Where in the run the raid starts, as a fraction of `messages`.
    /// None disables it.
    pub raid_at: Option<f64>,
    pub raid_size: usize,
    pub toxic_rate: f64,
    pub spam_rate: f64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            users: 200,
            messages: 5_000,
            messages_per_sec: 20.0,
            raid_at: Some(0.5),
            raid_size: 150,
            toxic_rate: 0.05,
            spam_rate: 0.03,
        }
    }
}

const CHATTER: &[&str] = &[
    "gg",
    "nice play!",
    "anyone up for a match?",
    "lol that was close",
    "how do I unlock the new map?",
    "brb",
    "that boss fight is wild",
    "welcome back!",
    "which build are you running?",
    "ty for the tip",
];

const TOXIC: &[&str] = &[
    "you're an idiot",
    "shut up loser",
    "worthless moron",
    "nobody likes you",
    "you suck, uninstall",
];

const SPAM: &[&str] = &[
    "FREE COINS AT http://coins.example.com!!!!!",
    "buy followers cheap, dm me",
    "free crypto giveaway, click now",
];

const RAID_TEXT: &str = "RAID RAID RAID join us at http://raid.example.com";

/// Generate a full run of chat traffic, ordered by event time.
pub fn generate(config: &ChatConfig, seed: u64, start: DateTime<Utc>) -> Vec<ChatMessage> {
    let mut rng = StdRng::seed_from_u64(seed);
    let channels: Vec<String> = (0..config.channels.max(1)).map(|i| format!("channel-{i}")).collect();
    let users: Vec<String> = (0..config.users.max(1)).map(|i| format!("chatter-{i:04}")).collect();
    let step_us = (1_000_000.0 / config.messages_per_sec.max(0.001)) as i64;
    let raid_start = config
        .raid_at
        .map(|at| (at.clamp(0.0, 1.0) * config.messages as f64) as usize);

    let mut messages = Vec::with_capacity(config.messages + config.raid_size);
    let mut now = start;
    for i in 0..config.messages {
        now += chrono::Duration::microseconds(step_us);

        if raid_start == Some(i) {
            let target = channels[0].clone();
            for r in 0..config.raid_size {
                // Whole raid lands inside one second.
                let at = now + chrono::Duration::microseconds((r as i64 * 900_000) / config.raid_size.max(1) as i64);
                messages.push(ChatMessage::new(
                    format!("raid-{r:04}"),
                    format!("raider-{r:04}"),
                    target.clone(),
                    RAID_TEXT,
                    at,
                ));
            }
            now += chrono::Duration::seconds(1);
        }

        let roll: f64 = rng.random();
        let pool = if roll < config.toxic_rate {
            TOXIC
        } else if roll < config.toxic_rate + config.spam_rate {
            SPAM
        } else {
            CHATTER
        };
        let text = pool.choose(&mut rng).copied().unwrap_or("gg");
        let author = users.choose(&mut rng).cloned().unwrap_or_default();
        let channel = channels.choose(&mut rng).cloned().unwrap_or_default();
        messages.push(ChatMessage::new(format!("msg-{i:06}"), author, channel, text, now));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raid_floods_the_first_channel_within_a_second() {
        let config = ChatConfig {
            messages: 200,
            raid_size: 50,
            ..ChatConfig::default()
        };
        let messages = generate(&config, 3, Utc::now());
        assert_eq!(messages.len(), 250);

        let raid: Vec<&ChatMessage> = messages.iter().filter(|m| m.id.starts_with("raid-")).collect();
        assert_eq!(raid.len(), 50);
        assert!(raid.iter().all(|m| m.channel_id == "channel-0"));
        let span = raid[raid.len() - 1].event_time - raid[0].event_time;
        assert!(span < chrono::Duration::seconds(1), "Raid spread over {span}");
    }

    #[test]
    fn event_times_never_go_backwards() {
        let config = ChatConfig {
            messages: 500,
            raid_at: None,
            ..ChatConfig::default()
        };
        let messages = generate(&config, 9, Utc::now());
        assert!(messages.windows(2).all(|w| w[0].event_time <= w[1].event_time));
    }
}
