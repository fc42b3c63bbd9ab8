use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::content::{ContentItem, ShareEvent};
use crate::error::{EngineError, EngineResult};
use crate::scoring::{BadgeTierTracker, SharePointCalculator};
use crate::user::{ProfileAccrual, UserProfile};
use crate::{Activatable, ItemId, UserId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SocialState {
    profiles: BTreeMap<UserId, UserProfile>,
    items: BTreeMap<ItemId, ContentItem>,
    shares: Vec<ShareEvent>,
}

/// Sharer activity inside the two rate windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ShareWindow {
    last_hour: u64,
    today: u64,
}

/// Result of overwriting an item's reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachUpdate {
    pub item_id: ItemId,
    pub creator_id: UserId,
    pub previous: u64,
    pub current: u64,
}

impl ReachUpdate {
    pub fn delta(&self) -> i64 {
        self.current as i64 - self.previous as i64
    }
}

/// Profiles, content items and share events behind one lock.
///
/// Every mutation runs its read-modify-write under the write guard and
/// persists before releasing it, so concurrent shares and views on the same
/// item or profile serialize instead of racing.
pub struct SocialStore {
    path: Option<PathBuf>,
    state: RwLock<SocialState>,
}

impl SocialStore {
    pub async fn load(path: PathBuf) -> EngineResult<Self> {
        let state = load_json(&path, "social state").await?;
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(SocialState::default()),
        }
    }

    /// Insert-if-absent on the user id.
    pub async fn register_profile(&self, profile: UserProfile) -> EngineResult<UserProfile> {
        let mut guard = self.state.write().await;
        if guard.profiles.contains_key(&profile.user_id) {
            return Err(EngineError::Duplicate(format!(
                "user {} already exists",
                profile.user_id
            )));
        }
        guard.profiles.insert(profile.user_id, profile.clone());
        self.persist(&guard).await?;
        Ok(profile)
    }

    pub async fn profile(&self, user_id: UserId) -> Option<UserProfile> {
        let guard = self.state.read().await;
        guard.profiles.get(&user_id).cloned()
    }

    pub async fn accrual(&self, user_id: UserId) -> EngineResult<ProfileAccrual> {
        let guard = self.state.read().await;
        guard
            .profiles
            .get(&user_id)
            .map(|profile| profile.accrual)
            .ok_or_else(|| profile_not_found(user_id))
    }

    pub async fn follow(&self, follower_id: UserId, creator_id: UserId) -> EngineResult<bool> {
        if follower_id == creator_id {
            return Err(EngineError::Validation("users cannot follow themselves".to_string()));
        }
        let mut guard = self.state.write().await;
        if !guard.profiles.contains_key(&creator_id) {
            return Err(profile_not_found(creator_id));
        }
        let follower = guard
            .profiles
            .get_mut(&follower_id)
            .ok_or_else(|| profile_not_found(follower_id))?;
        let added = follower.following.insert(creator_id);
        if added {
            if let Some(creator) = guard.profiles.get_mut(&creator_id) {
                creator.followers_count += 1;
            }
            self.persist(&guard).await?;
        }
        Ok(added)
    }

    pub async fn hide_item(&self, user_id: UserId, item_id: ItemId) -> EngineResult<()> {
        let mut guard = self.state.write().await;
        if !guard.items.contains_key(&item_id) {
            return Err(item_not_found(item_id));
        }
        let profile = guard
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| profile_not_found(user_id))?;
        if profile.hidden_items.insert(item_id) {
            self.persist(&guard).await?;
        }
        Ok(())
    }

    pub async fn insert_item(&self, item: ContentItem) -> EngineResult<ContentItem> {
        let mut guard = self.state.write().await;
        if guard.items.contains_key(&item.id) {
            return Err(EngineError::Duplicate(format!("item {} already exists", item.id)));
        }
        if !guard.profiles.contains_key(&item.creator_id) {
            return Err(profile_not_found(item.creator_id));
        }
        guard.items.insert(item.id, item.clone());
        self.persist(&guard).await?;
        Ok(item)
    }

    pub async fn item(&self, item_id: ItemId) -> Option<ContentItem> {
        let guard = self.state.read().await;
        guard.items.get(&item_id).cloned()
    }

    pub async fn follower_count(&self, user_id: UserId) -> u64 {
        let guard = self.state.read().await;
        guard
            .profiles
            .get(&user_id)
            .map(|profile| profile.followers_count)
            .unwrap_or(0)
    }

    pub async fn follower_counts(&self) -> HashMap<UserId, u64> {
        let guard = self.state.read().await;
        guard
            .profiles
            .values()
            .map(|profile| (profile.user_id, profile.followers_count))
            .collect()
    }

    pub async fn total_user_count(&self) -> u64 {
        let guard = self.state.read().await;
        guard.profiles.len() as u64
    }

    pub async fn active_items(&self) -> Vec<ContentItem> {
        let guard = self.state.read().await;
        guard
            .items
            .values()
            .filter(|item| item.is_active())
            .cloned()
            .collect()
    }

    pub async fn add_view(&self, item_id: ItemId) -> EngineResult<ContentItem> {
        let mut guard = self.state.write().await;
        let item = guard
            .items
            .get_mut(&item_id)
            .ok_or_else(|| item_not_found(item_id))?;
        item.views += 1;
        let updated = item.clone();
        self.persist(&guard).await?;
        Ok(updated)
    }

    /// Overwrites an item's reach and moves the creator's `total_reach` by
    /// the difference, in one critical section.
    pub async fn record_reach(&self, item_id: ItemId, reach: u64) -> EngineResult<ReachUpdate> {
        let mut guard = self.state.write().await;
        let update = set_reach(&mut guard, item_id, reach)?;
        self.persist(&guard).await?;
        Ok(update)
    }

    /// Prices the share against the sharer's windows and inserts it if the
    /// (item, sharer) pair is new and the sharer is under both caps. The
    /// incoming `points_earned` is the base value before the daily bonus.
    /// Bumps the item's share count and the sharer's accrual, and fills
    /// `badge_tier_at_time` with the post-accrual tier.
    pub async fn commit_share(
        &self,
        mut event: ShareEvent,
        share_points: &SharePointCalculator,
        badges: &BadgeTierTracker,
    ) -> EngineResult<(ShareEvent, ProfileAccrual)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let limits = share_points.config();

        let window = count_window(&state.shares, event.sharer_id, event.created_at);
        if window.last_hour >= limits.hourly_cap {
            return Err(EngineError::RateLimited(format!(
                "hourly share limit reached ({}/hour)",
                limits.hourly_cap
            )));
        }
        if window.today >= limits.daily_cap {
            return Err(EngineError::RateLimited(format!(
                "daily share limit reached ({}/day)",
                limits.daily_cap
            )));
        }
        if state
            .shares
            .iter()
            .any(|share| share.item_id == event.item_id && share.sharer_id == event.sharer_id)
        {
            return Err(EngineError::Duplicate(format!(
                "user {} already shared item {}",
                event.sharer_id, event.item_id
            )));
        }

        let profile = state
            .profiles
            .get_mut(&event.sharer_id)
            .ok_or_else(|| profile_not_found(event.sharer_id))?;
        let item = state
            .items
            .get_mut(&event.item_id)
            .ok_or_else(|| item_not_found(event.item_id))?;

        event.points_earned = share_points.apply_daily_bonus(event.points_earned, window.today);
        item.shares += 1;
        let accrual = badges.accrue(profile.accrual.total_share_points, event.points_earned);
        profile.accrual.total_share_points = accrual.total_share_points;
        profile.accrual.badge_tier = accrual.tier;
        let updated = profile.accrual;

        event.badge_tier_at_time = accrual.tier;
        state.shares.push(event.clone());

        self.persist(state).await?;
        Ok((event, updated))
    }

    pub async fn shares_by(&self, sharer_id: UserId) -> Vec<ShareEvent> {
        let guard = self.state.read().await;
        guard
            .shares
            .iter()
            .filter(|share| share.sharer_id == sharer_id)
            .cloned()
            .collect()
    }

    /// The creator's newest active item other than `exclude`.
    pub async fn latest_other_item(&self, creator_id: UserId, exclude: ItemId) -> Option<ContentItem> {
        let guard = self.state.read().await;
        guard
            .items
            .values()
            .filter(|item| item.creator_id == creator_id && item.id != exclude && item.is_active())
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned()
    }

    /// Raises reach to `floor` (capped at the user count) if it is lower.
    pub async fn raise_reach_floor(&self, item_id: ItemId, floor: u64) -> EngineResult<ReachUpdate> {
        let mut guard = self.state.write().await;
        let total_users = guard.profiles.len() as u64;
        let current = guard
            .items
            .get(&item_id)
            .ok_or_else(|| item_not_found(item_id))?
            .reach;
        let update = set_reach(&mut guard, item_id, current.max(floor.min(total_users)))?;
        self.persist(&guard).await?;
        Ok(update)
    }

    pub async fn set_item_active(&self, item_id: ItemId, active: bool) -> EngineResult<ContentItem> {
        let mut guard = self.state.write().await;
        let item = guard
            .items
            .get_mut(&item_id)
            .ok_or_else(|| item_not_found(item_id))?;
        if item.is_active() == active {
            return Ok(item.clone());
        }
        item.set_active(active);
        let updated = item.clone();
        let delta = if active {
            updated.reach as i64
        } else {
            -(updated.reach as i64)
        };
        if let Some(creator) = guard.profiles.get_mut(&updated.creator_id) {
            creator.accrual.total_reach = apply_delta(creator.accrual.total_reach, delta);
        }
        self.persist(&guard).await?;
        Ok(updated)
    }

    async fn persist(&self, state: &SocialState) -> EngineResult<()> {
        match self.path.as_ref() {
            Some(path) => persist_json(path, state, "social state").await,
            None => Ok(()),
        }
    }
}

/// Writes the item's reach and moves the creator's total by the delta
/// when the item is active.
fn set_reach(state: &mut SocialState, item_id: ItemId, reach: u64) -> EngineResult<ReachUpdate> {
    let item = state
        .items
        .get_mut(&item_id)
        .ok_or_else(|| item_not_found(item_id))?;
    let update = ReachUpdate {
        item_id,
        creator_id: item.creator_id,
        previous: item.reach,
        current: reach,
    };
    item.reach = reach;
    if item.is_active() {
        if let Some(creator) = state.profiles.get_mut(&update.creator_id) {
            creator.accrual.total_reach = apply_delta(creator.accrual.total_reach, update.delta());
        }
    }
    Ok(update)
}

fn count_window(shares: &[ShareEvent], sharer_id: UserId, now: DateTime<Utc>) -> ShareWindow {
    let hour_ago = now - Duration::hours(1);
    let day_start = now.date_naive().and_hms_opt(0, 0, 0).map(|start| start.and_utc());

    shares
        .iter()
        .filter(|share| share.sharer_id == sharer_id)
        .fold(ShareWindow::default(), |mut window, share| {
            if share.created_at >= hour_ago {
                window.last_hour += 1;
            }
            if day_start.map_or(false, |start| share.created_at >= start) {
                window.today += 1;
            }
            window
        })
}

fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

fn profile_not_found(user_id: UserId) -> EngineError {
    EngineError::NotFound(format!("user profile {}", user_id))
}

fn item_not_found(item_id: ItemId) -> EngineError {
    EngineError::NotFound(format!("item {}", item_id))
}

pub(crate) async fn load_json<T>(path: &Path, label: &str) -> EngineResult<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| EngineError::Storage(format!("failed to read {}: {}", label, err)))?;
    if data.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&data)
        .map_err(|err| EngineError::Storage(format!("failed to parse {}: {}", label, err)))
}

pub(crate) async fn persist_json<T: Serialize>(path: &Path, value: &T, label: &str) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    let payload = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, payload)
        .await
        .map_err(|err| EngineError::Storage(format!("failed to write {}: {}", label, err)))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|err| EngineError::Storage(format!("failed to finalize {}: {}", label, err)))?;
    Ok(())
}

async fn ensure_dir(path: &Path) -> EngineResult<()> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|err| EngineError::Storage(format!("failed to create data dir: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    fn share(sharer_id: UserId, item_id: ItemId, created_at: DateTime<Utc>) -> ShareEvent {
        ShareEvent {
            item_id,
            sharer_id,
            points_earned: 10,
            badge_tier_at_time: Default::default(),
            created_at,
        }
    }

    #[test]
    fn window_counts_last_hour_and_utc_day() {
        let shares = vec![
            share(1, 10, Utc.with_ymd_and_hms(2024, 4, 30, 23, 30, 0).unwrap()),
            share(1, 11, at(0, 10)),
            share(1, 12, at(0, 40)),
            share(2, 13, at(0, 45)),
        ];
        let window = count_window(&shares, 1, at(0, 50));
        assert_eq!(window.last_hour, 3);
        assert_eq!(window.today, 2);
    }

    #[test]
    fn delta_saturates_at_zero() {
        assert_eq!(apply_delta(5, -10), 0);
        assert_eq!(apply_delta(5, 10), 15);
    }

    async fn seeded(users: u64, items: &[ItemId]) -> SocialStore {
        let store = SocialStore::in_memory();
        for user_id in 1..=users {
            store
                .register_profile(UserProfile::new(user_id, format!("user{}", user_id)))
                .await
                .unwrap();
        }
        for &item_id in items {
            store
                .insert_item(ContentItem::new(item_id, 1, "reel", at(9, 0)))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn register_rejects_existing_user() {
        let store = seeded(2, &[]).await;
        let err = store
            .register_profile(UserProfile::new(2, "again"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Duplicate(_)));
        assert_eq!(store.profile(2).await.unwrap().username, "user2");
    }

    #[tokio::test]
    async fn commit_share_prices_against_the_committed_window() {
        let store = seeded(2, &[10, 11, 12]).await;
        let calculator = SharePointCalculator::new(Default::default());
        let badges = BadgeTierTracker::new(Default::default());

        let mut earned = Vec::new();
        for (minute, item_id) in [(1, 10), (2, 11)] {
            let (event, _) = store
                .commit_share(share(2, item_id, at(10, minute)), &calculator, &badges)
                .await
                .unwrap();
            earned.push(event.points_earned);
        }
        // base of 10 with the first and early bonuses
        assert_eq!(earned, vec![15, 12]);
        assert_eq!(store.accrual(2).await.unwrap().total_share_points, 27);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_shares_never_both_get_first_bonus() {
        let store = std::sync::Arc::new(seeded(2, &[10, 11]).await);
        let calculator = std::sync::Arc::new(SharePointCalculator::new(Default::default()));
        let badges = std::sync::Arc::new(BadgeTierTracker::new(Default::default()));

        let tasks: Vec<_> = [10, 11]
            .into_iter()
            .map(|item_id| {
                let store = store.clone();
                let calculator = calculator.clone();
                let badges = badges.clone();
                tokio::spawn(async move {
                    store
                        .commit_share(share(2, item_id, at(10, 1)), &calculator, &badges)
                        .await
                        .unwrap()
                        .0
                        .points_earned
                })
            })
            .collect();

        let mut earned = Vec::new();
        for task in tasks {
            earned.push(task.await.unwrap());
        }
        earned.sort_unstable();
        assert_eq!(earned, vec![12, 15]);
    }

    #[tokio::test]
    async fn reach_floor_only_raises_and_caps_at_user_count() {
        let store = seeded(3, &[10]).await;
        store.record_reach(10, 2).await.unwrap();

        let raised = store.raise_reach_floor(10, 500).await.unwrap();
        assert_eq!((raised.previous, raised.current), (2, 3));
        assert_eq!(store.accrual(1).await.unwrap().total_reach, 3);

        let kept = store.raise_reach_floor(10, 1).await.unwrap();
        assert_eq!(kept.current, 3);
        assert_eq!(store.accrual(1).await.unwrap().total_reach, 3);

        let err = store.raise_reach_floor(404, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
