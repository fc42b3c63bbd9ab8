use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::scoring::BadgeTier;
use crate::{Activatable, EngagementSnapshot, ItemId, UserId};

/// A published reel or post. Owns its reach record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub creator_id: UserId,
    pub caption: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub likes: u64,
    pub top_level_comments: u64,
    pub replies: u64,
    pub shares: u64,
    pub saves: u64,
    pub views: u64,
    pub watch_ratio: f64,
    pub reach: u64,
    pub is_active: bool,
}

impl ContentItem {
    pub fn new(id: ItemId, creator_id: UserId, caption: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            creator_id,
            caption: caption.into(),
            tags: BTreeSet::new(),
            created_at,
            likes: 0,
            top_level_comments: 0,
            replies: 0,
            shares: 0,
            saves: 0,
            views: 0,
            watch_ratio: 1.0,
            reach: 0,
            is_active: true,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn snapshot(&self) -> EngagementSnapshot {
        EngagementSnapshot {
            likes: self.likes,
            top_level_comments: self.top_level_comments,
            replies: self.replies,
            shares: self.shares,
            saves: self.saves,
            views: self.views,
            watch_ratio: self.watch_ratio,
        }
    }

    pub fn hours_old(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.created_at).num_seconds().max(0);
        seconds as f64 / 3600.0
    }
}

impl Activatable for ContentItem {
    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }
}

/// One user sharing one item. Points are fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEvent {
    pub item_id: ItemId,
    pub sharer_id: UserId,
    pub points_earned: u64,
    pub badge_tier_at_time: BadgeTier,
    pub created_at: DateTime<Utc>,
}
