use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::random::RandomSource;
use crate::EngagementSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementWeights {
    pub like: f64,
    pub comment: f64,
    pub reply: f64,
    pub share: f64,
    pub save: f64,
    pub view: f64,
    pub watch: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            like: 1.5,
            comment: 3.0,
            reply: 4.0,
            share: 6.0,
            save: 5.0,
            view: 0.2,
            watch: 2.0,
        }
    }
}

impl EngagementWeights {
    pub fn engagement_reach(&self, snapshot: &EngagementSnapshot) -> f64 {
        let mut reach = 0.0;

        reach += snapshot.likes as f64 * self.like;
        reach += snapshot.top_level_comments as f64 * self.comment;
        reach += snapshot.replies as f64 * self.reply;
        reach += snapshot.shares as f64 * self.share;
        reach += snapshot.saves as f64 * self.save;
        reach += snapshot.views as f64 * self.view;
        reach += snapshot.watch_ratio.max(0.0) * self.watch;

        reach
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachConfig {
    pub weights: EngagementWeights,
    pub base_boost_min: u64,
    pub base_boost_max: u64,
    pub random_boost_min: f64,
    pub random_boost_max: f64,
    pub engagement_rate_factor: f64,
    pub max_cap_multiplier: f64,
    pub viral_base_chance: f64,
    pub viral_chance_cap: f64,
    pub viral_multiplier_min: f64,
    pub viral_multiplier_max: f64,
}

impl Default for ReachConfig {
    fn default() -> Self {
        Self {
            weights: EngagementWeights::default(),
            base_boost_min: 200,
            base_boost_max: 700,
            random_boost_min: 0.05,
            random_boost_max: 0.2,
            engagement_rate_factor: 5.0,
            max_cap_multiplier: 10.0,
            viral_base_chance: 0.03,
            viral_chance_cap: 0.25,
            viral_multiplier_min: 1.5,
            viral_multiplier_max: 3.0,
        }
    }
}

/// Everything the estimator needs about one item and its audience.
#[derive(Debug, Clone)]
pub struct ReachInput {
    pub snapshot: EngagementSnapshot,
    pub followers_count: u64,
    pub total_user_count: u64,
    pub badge_min_reach: Option<u64>,
}

/// Intermediate values of one estimate, kept for logging and tests.
#[derive(Debug, Clone, Serialize)]
pub struct ReachBreakdown {
    pub initial_reach: f64,
    pub engagement_reach: f64,
    pub random_boost: f64,
    pub max_reach: f64,
    pub viral: bool,
    pub reach: u64,
}

#[derive(Debug, Clone)]
pub struct ReachEstimator {
    config: ReachConfig,
}

impl ReachEstimator {
    pub fn new(config: ReachConfig) -> Self {
        Self { config }
    }

    pub fn estimate<R: RandomSource + ?Sized>(&self, input: &ReachInput, rng: &mut R) -> u64 {
        self.estimate_detailed(input, rng).reach
    }

    pub fn estimate_detailed<R: RandomSource + ?Sized>(
        &self,
        input: &ReachInput,
        rng: &mut R,
    ) -> ReachBreakdown {
        let total_users = input.total_user_count as f64;

        let base_reach = input.followers_count
            + rng.int_in(self.config.base_boost_min, self.config.base_boost_max);
        let initial_reach = (base_reach as f64).min(total_users);

        let engagement_reach = self.config.weights.engagement_reach(&input.snapshot);
        let random_boost = if engagement_reach > 0.0 {
            engagement_reach
                * rng.float_in(self.config.random_boost_min, self.config.random_boost_max)
        } else {
            0.0
        };

        let pre_cap_reach = initial_reach + engagement_reach + random_boost;

        let engagement_rate = engagement_reach / input.snapshot.views.max(1) as f64;
        let cap_multiplier = 1.0
            + (engagement_rate * self.config.engagement_rate_factor)
                .min(self.config.max_cap_multiplier);
        let max_reach = initial_reach * cap_multiplier;

        let mut reach = pre_cap_reach.min(max_reach);

        let viral_chance = self.viral_chance(engagement_reach);
        let viral = rng.roll() < viral_chance;
        if viral {
            reach *= rng.float_in(
                self.config.viral_multiplier_min,
                self.config.viral_multiplier_max,
            );
        }

        if let Some(floor) = input.badge_min_reach {
            reach = reach.max(floor as f64);
        }

        let reach = finalize(reach, input.total_user_count);

        debug!(
            initial_reach,
            engagement_reach, random_boost, max_reach, viral, reach, "reach estimated"
        );

        ReachBreakdown {
            initial_reach,
            engagement_reach,
            random_boost,
            max_reach,
            viral,
            reach,
        }
    }

    pub fn viral_chance(&self, engagement_reach: f64) -> f64 {
        (self.config.viral_base_chance + engagement_reach / 100.0 * 0.01)
            .min(self.config.viral_chance_cap)
    }
}

fn finalize(reach: f64, total_user_count: u64) -> u64 {
    if reach.is_nan() || reach <= 0.0 {
        return 0;
    }
    let rounded = reach.round();
    if rounded >= total_user_count as f64 {
        total_user_count
    } else {
        rounded as u64
    }
}
