use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::scoring::BadgeTier;
use crate::{ItemId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    /// Creators this user follows.
    pub following: BTreeSet<UserId>,
    pub followers_count: u64,
    pub engaged_tags: BTreeSet<String>,
    pub hidden_items: BTreeSet<ItemId>,
    #[serde(default)]
    pub accrual: ProfileAccrual,
}

impl UserProfile {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            following: BTreeSet::new(),
            followers_count: 0,
            engaged_tags: BTreeSet::new(),
            hidden_items: BTreeSet::new(),
            accrual: ProfileAccrual::default(),
        }
    }
}

/// Running share and reach totals owned by a profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProfileAccrual {
    pub total_share_points: u64,
    pub badge_tier: BadgeTier,
    pub total_reach: u64,
}
