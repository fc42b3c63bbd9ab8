use serde::{Deserialize, Serialize};

use crate::random::RandomSource;
use crate::scoring::SharePointCalculator;
use crate::{round_to, EngagementSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedWeights {
    pub like: f64,
    pub comment: f64,
    pub reply: f64,
    pub share: f64,
    pub save: f64,
    pub view: f64,
}

impl Default for FeedWeights {
    fn default() -> Self {
        Self {
            like: 2.0,
            comment: 3.0,
            reply: 2.0,
            share: 8.0,
            save: 4.0,
            view: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub weights: FeedWeights,
    pub followed_bonus: f64,
    pub new_creator_bonus: f64,
    pub new_creator_followers: u64,
    pub decay_per_hour: f64,
    pub season_bonus: f64,
    pub season_keywords: Vec<String>,
    pub morning_bonus: f64,
    pub evening_bonus: f64,
    pub night_penalty: f64,
    pub discovery_views: u64,
    pub discovery_chance: f64,
    pub discovery_min: f64,
    pub discovery_max: f64,
    pub score_cap: f64,
    pub default_limit: usize,
    pub personalized_share: f64,
    pub social_share: f64,
    pub fresh_pool: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            weights: FeedWeights::default(),
            followed_bonus: 200.0,
            new_creator_bonus: 50.0,
            new_creator_followers: 50,
            decay_per_hour: 1.0,
            season_bonus: 50.0,
            season_keywords: Vec::new(),
            morning_bonus: 20.0,
            evening_bonus: 40.0,
            night_penalty: 20.0,
            discovery_views: 100,
            discovery_chance: 0.1,
            discovery_min: 1.5,
            discovery_max: 2.0,
            score_cap: 1_000.0,
            default_limit: 20,
            personalized_share: 0.7,
            social_share: 0.1,
            fresh_pool: 200,
        }
    }
}

/// One candidate as seen by one viewer.
#[derive(Debug, Clone)]
pub struct FeedSignals<'a> {
    pub snapshot: EngagementSnapshot,
    pub reach: Option<u64>,
    pub is_followed_creator: bool,
    pub creator_followers: u64,
    pub hours_old: f64,
    pub caption: &'a str,
    pub current_hour: u8,
}

#[derive(Debug, Clone)]
pub struct FeedScorer {
    config: FeedConfig,
    share_points: SharePointCalculator,
}

impl FeedScorer {
    pub fn new(config: FeedConfig, share_points: SharePointCalculator) -> Self {
        Self {
            config,
            share_points,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn score<R: RandomSource + ?Sized>(&self, signals: &FeedSignals<'_>, rng: &mut R) -> f64 {
        self.score_with_keywords(signals, &self.config.season_keywords, rng)
    }

    pub fn score_with_keywords<R: RandomSource + ?Sized>(
        &self,
        signals: &FeedSignals<'_>,
        season_keywords: &[String],
        rng: &mut R,
    ) -> f64 {
        let config = &self.config;
        let weights = &config.weights;
        let snapshot = &signals.snapshot;
        let mut score = 0.0;

        if signals.is_followed_creator {
            score += config.followed_bonus;
        } else if signals.creator_followers < config.new_creator_followers {
            score += config.new_creator_bonus;
        }

        score += snapshot.likes as f64 * weights.like;
        score += snapshot.top_level_comments as f64 * weights.comment;
        score += snapshot.replies as f64 * weights.reply;
        score += snapshot.shares as f64 * weights.share;
        score += snapshot.saves as f64 * weights.save;
        score += snapshot.views as f64 * weights.view;

        score += self.share_points.points(snapshot, signals.reach) as f64;

        score -= signals.hours_old.max(0.0) * config.decay_per_hour;

        if matches_season(signals.caption, season_keywords) {
            score += config.season_bonus;
        }

        score += self.time_of_day_bonus(signals.current_hour);

        let discoverable = signals.creator_followers < config.new_creator_followers
            || snapshot.views < config.discovery_views;
        if discoverable && rng.roll() < config.discovery_chance {
            score *= rng.float_in(config.discovery_min, config.discovery_max);
        }

        round_to(score.min(config.score_cap), 2)
    }

    pub fn time_of_day_bonus(&self, hour: u8) -> f64 {
        match hour {
            7..=9 => self.config.morning_bonus,
            19..=22 => self.config.evening_bonus,
            0..=4 => -self.config.night_penalty,
            _ => 0.0,
        }
    }
}

fn matches_season(caption: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() || caption.is_empty() {
        return false;
    }
    let caption = caption.to_lowercase();
    keywords
        .iter()
        .filter(|keyword| !keyword.trim().is_empty())
        .any(|keyword| caption.contains(&keyword.to_lowercase()))
}
