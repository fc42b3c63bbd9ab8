use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::content::{ContentItem, ShareEvent};
use crate::error::{EngineError, EngineResult};
use crate::feed::{FeedRequest, ViewerContext};
use crate::random::{RandomSource, SeededRandom};
use crate::scoring::{BadgeTier, ReachInput, ScoredCandidate};
use crate::store::SocialStore;
use crate::user::UserProfile;
use crate::{ItemId, Scorers, UserId};

/// Reach floor for items published by any badge holder.
pub const PUBLISH_BADGE_FLOOR: u64 = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct ShareReceipt {
    pub item_id: ItemId,
    pub points_earned: u64,
    pub total_share_points: u64,
    pub badge_tier: BadgeTier,
    pub reach: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewReceipt {
    pub item_id: ItemId,
    pub views: u64,
    pub reach: u64,
}

/// Publish, view, share and feed flows over a `SocialStore`.
pub struct EngagementService {
    store: Arc<SocialStore>,
    scorers: Scorers,
    rng: Mutex<Box<dyn RandomSource + Send>>,
}

impl EngagementService {
    pub fn new(store: Arc<SocialStore>, scorers: Scorers) -> Self {
        Self {
            store,
            scorers,
            rng: Mutex::new(Box::new(SeededRandom::from_entropy())),
        }
    }

    pub fn with_random<R>(mut self, rng: R) -> Self
    where
        R: RandomSource + Send + 'static,
    {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn store(&self) -> &Arc<SocialStore> {
        &self.store
    }

    pub fn scorers(&self) -> &Scorers {
        &self.scorers
    }

    /// Creates a profile. Usernames must be non-empty; ids are unique.
    pub async fn register_user(&self, mut profile: UserProfile) -> EngineResult<UserProfile> {
        profile.username = profile.username.trim().to_string();
        if profile.username.is_empty() {
            return Err(EngineError::Validation("username must not be empty".to_string()));
        }
        profile.following.clear();
        profile.followers_count = 0;
        profile.hidden_items.clear();
        profile.accrual = Default::default();
        let profile = self.store.register_profile(profile).await?;
        info!(user_id = profile.user_id, username = %profile.username, "user registered");
        Ok(profile)
    }

    /// Returns false when the follow already existed.
    pub async fn follow(&self, follower_id: UserId, creator_id: UserId) -> EngineResult<bool> {
        let added = self.store.follow(follower_id, creator_id).await?;
        if added {
            debug!(follower_id, creator_id, "follow recorded");
        }
        Ok(added)
    }

    pub async fn publish_item(&self, mut item: ContentItem) -> EngineResult<ContentItem> {
        let accrual = self.store.accrual(item.creator_id).await?;
        item.reach = 0;
        let item = self.store.insert_item(item).await?;

        let floor = accrual.badge_tier.is_badge().then_some(PUBLISH_BADGE_FLOOR);
        let reach = self.estimate_reach(&item, floor).await;
        let update = self.store.record_reach(item.id, reach).await?;

        info!(item_id = item.id, creator_id = item.creator_id, reach = update.current, "item published");
        Ok(ContentItem {
            reach: update.current,
            ..item
        })
    }

    pub async fn record_view(&self, item_id: ItemId) -> EngineResult<ViewReceipt> {
        let item = self.store.add_view(item_id).await?;
        let reach = self.estimate_reach(&item, None).await;
        let update = self.store.record_reach(item_id, reach).await?;
        debug!(item_id, views = item.views, reach = update.current, delta = update.delta(), "view recorded");
        Ok(ViewReceipt {
            item_id,
            views: item.views,
            reach: update.current,
        })
    }

    /// Awards share points, updates the sharer's badge and the item's reach.
    ///
    /// Rejects with `RateLimited` past the hourly or daily cap and with
    /// `Duplicate` when the sharer already shared the item.
    pub async fn share_item(
        &self,
        item_id: ItemId,
        sharer_id: UserId,
        now: DateTime<Utc>,
    ) -> EngineResult<ShareReceipt> {
        let item = self
            .store
            .item(item_id)
            .await
            .filter(|item| item.is_active)
            .ok_or_else(|| EngineError::NotFound(format!("item {}", item_id)))?;
        self.store.accrual(sharer_id).await?;

        let share_points = &self.scorers.share_points;
        let event = ShareEvent {
            item_id,
            sharer_id,
            points_earned: share_points.points(&item.snapshot(), Some(item.reach)),
            badge_tier_at_time: BadgeTier::None,
            created_at: now,
        };
        let (event, accrual) = match self
            .store
            .commit_share(event, share_points, &self.scorers.badges)
            .await
        {
            Ok(committed) => committed,
            Err(err) => {
                if matches!(err, EngineError::RateLimited(_)) {
                    warn!(sharer_id, item_id, "share rejected: {}", err);
                }
                return Err(err);
            }
        };

        let floor = accrual.badge_tier.min_reach();
        let shared = self
            .store
            .item(item_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("item {}", item_id)))?;
        let reach = self.estimate_reach(&shared, floor).await;
        let update = self.store.record_reach(item_id, reach).await?;

        if let Some(floor) = floor {
            if let Some(next) = self.store.latest_other_item(sharer_id, item_id).await {
                let raised = self.store.raise_reach_floor(next.id, floor).await?;
                debug!(item_id = next.id, reach = raised.current, "badge floor applied");
            }
        }

        info!(
            item_id,
            sharer_id,
            points = event.points_earned,
            total = accrual.total_share_points,
            tier = accrual.badge_tier.label(),
            "item shared"
        );

        Ok(ShareReceipt {
            item_id,
            points_earned: event.points_earned,
            total_share_points: accrual.total_share_points,
            badge_tier: accrual.badge_tier,
            reach: update.current,
        })
    }

    pub async fn hide_item(&self, user_id: UserId, item_id: ItemId) -> EngineResult<()> {
        self.store.hide_item(user_id, item_id).await
    }

    /// Soft delete by the creator. The item's reach leaves the creator's total.
    pub async fn deactivate_item(&self, item_id: ItemId, requester_id: UserId) -> EngineResult<ContentItem> {
        let item = self
            .store
            .item(item_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("item {}", item_id)))?;
        if item.creator_id != requester_id {
            return Err(EngineError::Validation(
                "only the creator can delete an item".to_string(),
            ));
        }
        self.store.set_item_active(item_id, false).await
    }

    /// One ranked page of the viewer's feed.
    pub async fn feed(
        &self,
        viewer_id: UserId,
        last_seen: Option<ItemId>,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<ScoredCandidate>> {
        let profile = self
            .store
            .profile(viewer_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("user profile {}", viewer_id)))?;
        let viewer = ViewerContext::from(&profile);
        let items = self.store.active_items().await;
        let followers = self.store.follower_counts().await;

        let composer = &self.scorers.feed;
        let request = FeedRequest {
            limit: limit
                .filter(|limit| *limit > 0)
                .unwrap_or(composer.config().default_limit),
            last_seen,
            now,
        };

        let page = self.with_rng(|rng| composer.compose(&viewer, &items, &followers, &request, rng));
        debug!(viewer_id, returned = page.len(), "feed composed");
        Ok(page)
    }

    async fn estimate_reach(&self, item: &ContentItem, badge_min_reach: Option<u64>) -> u64 {
        let input = ReachInput {
            snapshot: item.snapshot(),
            followers_count: self.store.follower_count(item.creator_id).await,
            total_user_count: self.store.total_user_count().await,
            badge_min_reach,
        };
        self.with_rng(|rng| self.scorers.reach.estimate(&input, rng))
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut (dyn RandomSource + Send)) -> T) -> T {
        let mut guard = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut **guard)
    }
}
