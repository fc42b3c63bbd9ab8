pub mod config;
pub mod content;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod game;
pub mod notify;
pub mod random;
pub mod scoring;
pub mod store;
pub mod user;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::feed::FeedComposer;
use crate::scoring::{BadgeTierTracker, FeedScorer, ReachEstimator, SharePointCalculator};

pub use config::GameConfig;
pub use error::{EngineError, EngineResult, ErrorKind};

pub type UserId = u64;
pub type ItemId = u64;
pub type GameId = u64;

/// Interaction counts for one item at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementSnapshot {
    pub likes: u64,
    pub top_level_comments: u64,
    pub replies: u64,
    pub shares: u64,
    pub saves: u64,
    pub views: u64,
    pub watch_ratio: f64,
}

/// Entities that support soft delete.
pub trait Activatable {
    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    fn deactivate(&mut self) {
        self.set_active(false);
    }

    fn activate(&mut self) {
        self.set_active(true);
    }
}

/// The scoring components wired from one configuration.
#[derive(Debug, Clone)]
pub struct Scorers {
    pub reach: ReachEstimator,
    pub share_points: SharePointCalculator,
    pub badges: BadgeTierTracker,
    pub feed: FeedComposer,
}

pub fn build_scorers(config: &EngineConfig) -> Scorers {
    let share_points = SharePointCalculator::new(config.share.clone());
    let feed_scorer = FeedScorer::new(config.feed.clone(), share_points.clone());
    Scorers {
        reach: ReachEstimator::new(config.reach.clone()),
        share_points,
        badges: BadgeTierTracker::new(config.badges.clone()),
        feed: FeedComposer::new(feed_scorer),
    }
}

pub fn round_to(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

pub fn format_number(value: f64) -> String {
    let rounded = value.round().max(0.0) as i64;
    let mut chars: Vec<char> = rounded.to_string().chars().collect();
    let mut result = String::new();
    let mut count = 0usize;

    while let Some(ch) = chars.pop() {
        if count == 3 {
            result.push(',');
            count = 0;
        }
        result.push(ch);
        count += 1;
    }

    result.chars().rev().collect()
}

pub fn format_float(value: f64, digits: usize) -> String {
    format!("{:.1$}", value, digits)
}
