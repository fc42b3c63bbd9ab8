use chrono::{DateTime, Timelike, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::content::ContentItem;
use crate::random::RandomSource;
use crate::scoring::{
    CandidateSource, FeedConfig, FeedScorer, FeedSignals, RankingPipeline, ScoredCandidate,
};
use crate::user::UserProfile;
use crate::{Activatable, ItemId, UserId};

/// What the composer needs to know about the viewer.
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    pub following: BTreeSet<UserId>,
    pub hidden: BTreeSet<ItemId>,
    pub engaged_tags: BTreeSet<String>,
}

impl From<&UserProfile> for ViewerContext {
    fn from(profile: &UserProfile) -> Self {
        Self {
            following: profile.following.clone(),
            hidden: profile.hidden_items.clone(),
            engaged_tags: profile.engaged_tags.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub limit: usize,
    pub last_seen: Option<ItemId>,
    pub now: DateTime<Utc>,
}

/// Sizes of the three candidate slices for a pool of `limit` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSizes {
    pub personalized: usize,
    pub social: usize,
}

#[derive(Debug, Clone)]
pub struct FeedComposer {
    config: FeedConfig,
    scorer: FeedScorer,
}

impl FeedComposer {
    pub fn new(scorer: FeedScorer) -> Self {
        Self {
            config: scorer.config().clone(),
            scorer,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn slice_sizes(&self, limit: usize) -> SliceSizes {
        SliceSizes {
            personalized: (limit as f64 * self.config.personalized_share) as usize,
            social: ((limit as f64 * self.config.social_share) as usize).max(1),
        }
    }

    /// Builds the personalized, social and fresh slices, in that order.
    pub fn candidates<'a, R: RandomSource + ?Sized>(
        &self,
        viewer: &ViewerContext,
        items: &'a [ContentItem],
        limit: usize,
        rng: &mut R,
    ) -> Vec<(&'a ContentItem, CandidateSource)> {
        let sizes = self.slice_sizes(limit);

        let mut newest: Vec<&ContentItem> = items
            .iter()
            .filter(|item| item.is_active() && !viewer.hidden.contains(&item.id))
            .collect();
        newest.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let mut picked: HashSet<ItemId> = HashSet::new();
        let mut candidates = Vec::new();

        let personalized: Vec<&ContentItem> = if viewer.engaged_tags.is_empty() {
            newest.iter().copied().take(sizes.personalized).collect()
        } else {
            newest
                .iter()
                .copied()
                .filter(|item| item.tags.iter().any(|tag| viewer.engaged_tags.contains(tag)))
                .take(sizes.personalized)
                .collect()
        };
        for item in personalized {
            picked.insert(item.id);
            candidates.push((item, CandidateSource::Personalized));
        }

        let social: Vec<&ContentItem> = newest
            .iter()
            .copied()
            .filter(|item| viewer.following.contains(&item.creator_id) && !picked.contains(&item.id))
            .take(sizes.social)
            .collect();
        for item in social {
            picked.insert(item.id);
            candidates.push((item, CandidateSource::Social));
        }

        let fresh_count = limit.saturating_sub(candidates.len());
        let pool: Vec<&ContentItem> = newest
            .iter()
            .copied()
            .filter(|item| !picked.contains(&item.id))
            .take(self.config.fresh_pool)
            .collect();
        for idx in rng.sample_indices(pool.len(), fresh_count) {
            candidates.push((pool[idx], CandidateSource::Fresh));
        }

        candidates
    }

    /// Ranked page of the viewer's feed.
    pub fn compose<R: RandomSource + ?Sized>(
        &self,
        viewer: &ViewerContext,
        items: &[ContentItem],
        creator_followers: &HashMap<UserId, u64>,
        request: &FeedRequest,
        rng: &mut R,
    ) -> Vec<ScoredCandidate> {
        let current_hour = request.now.hour() as u8;
        let candidates = self.candidates(viewer, items, request.limit, rng);

        let mut scored = Vec::with_capacity(candidates.len());
        for (item, source) in candidates {
            let signals = FeedSignals {
                snapshot: item.snapshot(),
                reach: Some(item.reach),
                is_followed_creator: viewer.following.contains(&item.creator_id),
                creator_followers: creator_followers.get(&item.creator_id).copied().unwrap_or(0),
                hours_old: item.hours_old(request.now),
                caption: &item.caption,
                current_hour,
            };
            let mut candidate = ScoredCandidate::new(item.id, item.creator_id, source);
            candidate.score = self.scorer.score(&signals, rng);
            scored.push(candidate);
        }

        RankingPipeline::new(request.limit).rank(scored, request.last_seen)
    }
}
