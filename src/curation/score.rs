//! Quality score in `0..=100` from engagement and length.
//!
//! Engagement terms are log-scaled so a post needs roughly 100K views,
//! 1K likes and 50 replies to land in the "good" range; length stops
//! contributing beyond 2000 words.

use crate::source::types::PostMetrics;

const VIEWS_WEIGHT: f64 = 0.35;
const LIKES_WEIGHT: f64 = 0.30;
const REPLIES_WEIGHT: f64 = 0.20;
const LENGTH_WEIGHT: f64 = 0.15;

pub fn calculate_score(metrics: &PostMetrics, word_count: usize) -> i32 {
    let total = log_component(metrics.views, 20.0) * VIEWS_WEIGHT
        + log_component(metrics.likes, 25.0) * LIKES_WEIGHT
        + log_component(metrics.replies, 30.0) * REPLIES_WEIGHT
        + length_component(word_count) * LENGTH_WEIGHT;

    (total.round() as i32).clamp(0, 100)
}

fn log_component(value: u64, multiplier: f64) -> f64 {
    if value == 0 {
        return 0.0;
    }
    ((value as f64 + 1.0).log10() * multiplier).min(100.0)
}

fn length_component(word_count: usize) -> f64 {
    let words = word_count as f64;
    match word_count {
        0..200 => 0.0,
        200..=500 => (words - 200.0) / 300.0 * 40.0,
        501..=1500 => 40.0 + (words - 500.0) / 1000.0 * 40.0,
        _ => 80.0 + ((words - 1500.0) / 500.0 * 20.0).min(20.0),
    }
}
