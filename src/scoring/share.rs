use serde::{Deserialize, Serialize};

use crate::EngagementSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareWeights {
    pub like: f64,
    pub comment: f64,
    pub reply: f64,
    pub save: f64,
    pub view: f64,
    /// Value of the share being scored.
    pub this_share: f64,
}

impl Default for ShareWeights {
    fn default() -> Self {
        Self {
            like: 1.5,
            comment: 3.0,
            reply: 4.0,
            save: 5.0,
            view: 0.2,
            this_share: 6.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub weights: ShareWeights,
    pub floor_points: u64,
    pub dampening_threshold: u64,
    pub dampening_divisor: f64,
    pub dampening_floor: f64,
    pub first_share_bonus: f64,
    pub early_share_bonus: f64,
    /// Shares of the day (0-based, inclusive) that still get the early bonus.
    pub early_share_last_index: u64,
    pub hourly_cap: u64,
    pub daily_cap: u64,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            weights: ShareWeights::default(),
            floor_points: 50,
            dampening_threshold: 5_000,
            dampening_divisor: 100_000.0,
            dampening_floor: 0.3,
            first_share_bonus: 1.5,
            early_share_bonus: 1.2,
            early_share_last_index: 2,
            hourly_cap: 3,
            daily_cap: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SharePointCalculator {
    config: ShareConfig,
}

impl SharePointCalculator {
    pub fn new(config: ShareConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    /// Points for sharing an item whose counts do not yet include this share.
    pub fn points(&self, snapshot: &EngagementSnapshot, reach: Option<u64>) -> u64 {
        let weights = &self.config.weights;
        let mut raw = 0.0;

        raw += snapshot.likes as f64 * weights.like;
        raw += snapshot.top_level_comments as f64 * weights.comment;
        raw += snapshot.replies as f64 * weights.reply;
        raw += snapshot.saves as f64 * weights.save;
        raw += snapshot.views as f64 * weights.view;
        raw += weights.this_share;

        let points = (raw * self.viral_factor(reach)).max(self.config.floor_points as f64);
        points.round() as u64
    }

    /// Dampening applied to items that already spread widely.
    pub fn viral_factor(&self, reach: Option<u64>) -> f64 {
        match reach {
            Some(reach) if reach > self.config.dampening_threshold => (1.0
                - reach as f64 / self.config.dampening_divisor)
                .max(self.config.dampening_floor),
            _ => 1.0,
        }
    }

    /// Bonus for the first shares of the day. `shares_today` counts the
    /// sharer's earlier shares on the same UTC day.
    pub fn apply_daily_bonus(&self, points: u64, shares_today: u64) -> u64 {
        let multiplier = if shares_today == 0 {
            self.config.first_share_bonus
        } else if shares_today <= self.config.early_share_last_index {
            self.config.early_share_bonus
        } else {
            1.0
        };
        (points as f64 * multiplier).round() as u64
    }
}
