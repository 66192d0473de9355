// Near-duplicate detection with SimHash + banded LSH.
//
// A 64-bit SimHash is computed over lowercase word bigrams. The index splits
// each hash into four 16-bit bands; two hashes within Hamming distance 3
// must agree on at least one band, so only items sharing a band are ever
// compared. Capacity is bounded with FIFO eviction.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use crate::scoring::lexicon::normalize;

const BANDS: usize = 4;
const BAND_BITS: u32 = 16;

fn hash_token<T: Hash + ?Sized>(token: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}

/// 64-bit SimHash of `text`. Empty text hashes to 0.
pub fn simhash(text: &str) -> u64 {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return 0;
    }

    let mut weights = [0i32; 64];
    let mut add = |h: u64| {
        for (bit, weight) in weights.iter_mut().enumerate() {
            if h >> bit & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    };

    if words.len() == 1 {
        add(hash_token(words[0]));
    } else {
        for pair in words.windows(2) {
            add(hash_token(&(pair[0], pair[1])));
        }
    }

    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1 << bit))
}

/// Exact-content hash for repeat detection in chat.
pub fn exact_fingerprint(text: &str) -> u64 {
    hash_token(normalize(text).as_str())
}

pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

fn band(hash: u64, index: usize) -> u16 {
    (hash >> (index as u32 * BAND_BITS)) as u16
}

pub struct FingerprintIndex {
    bands: [HashMap<u16, Vec<u64>>; BANDS],
    order: VecDeque<u64>,
    capacity: usize,
    max_distance: u32,
}

impl FingerprintIndex {
    pub fn new(capacity: usize, max_distance: u32) -> Self {
        Self {
            bands: Default::default(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            max_distance,
        }
    }

    /// Smallest Hamming distance to an indexed hash, if within range.
    pub fn nearest(&self, hash: u64) -> Option<u32> {
        (0..BANDS)
            .filter_map(|i| self.bands[i].get(&band(hash, i)))
            .flatten()
            .map(|candidate| hamming(hash, *candidate))
            .filter(|d| *d <= self.max_distance)
            .min()
    }

    pub fn insert(&mut self, hash: u64) {
        for (i, bucket) in self.bands.iter_mut().enumerate() {
            bucket.entry(band(hash, i)).or_default().push(hash);
        }
        self.order.push_back(hash);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.remove(oldest);
            }
        }
    }

    /// Look up `hash` and then index it. Returns the match distance, if any.
    pub fn check_and_insert(&mut self, hash: u64) -> Option<u32> {
        let found = self.nearest(hash);
        self.insert(hash);
        found
    }

    fn remove(&mut self, hash: u64) {
        for (i, bucket) in self.bands.iter_mut().enumerate() {
            let key = band(hash, i);
            if let Some(list) = bucket.get_mut(&key) {
                if let Some(pos) = list.iter().position(|h| *h == hash) {
                    list.swap_remove(pos);
                }
                if list.is_empty() {
                    bucket.remove(&key);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_identical_hash() {
        assert_eq!(simhash("Buy cheap followers today"), simhash("buy CHEAP followers, today!"));
    }

    #[test]
    fn small_edit_stays_close() {
        let a = simhash("limited offer click the link below to claim your free prize now friends");
        let b = simhash("limited offer click the link below to claim your free prize now pals");
        let c = simhash("the committee will meet on thursday to discuss the library budget");
        assert!(hamming(a, b) < hamming(a, c));
    }

    #[test]
    fn fifo_eviction_bounds_the_index() {
        let first = 0x00FF_00FF_00FF_00FFu64;
        let second = 0xFF00_FF00_FF00_FF00u64;
        let third = 0x0F0F_0F0F_0F0F_0F0Fu64;
        let mut index = FingerprintIndex::new(2, 3);
        index.insert(first);
        index.insert(second);
        index.insert(third);
        assert_eq!(index.len(), 2);
        assert_eq!(index.nearest(first), None);
        assert_eq!(index.nearest(third), Some(0));
    }

    #[test]
    fn near_match_within_distance() {
        let mut index = FingerprintIndex::new(10, 3);
        let base = 0x1234_5678_9ABC_DEF0u64;
        index.insert(base);
        assert_eq!(index.nearest(base ^ 0b101), Some(2));
        assert_eq!(index.nearest(base ^ 0b1111), None);
    }
}
