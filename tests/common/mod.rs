#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use reel_engine::config::EngineConfig;
use reel_engine::engagement::EngagementService;
use reel_engine::error::{EngineError, EngineResult};
use reel_engine::game::{FairnessKey, GameFairnessEngine, GameLifecycleManager, GameStore};
use reel_engine::notify::{Notification, NotificationKind, Notifier};
use reel_engine::random::ScriptedRandom;
use reel_engine::store::SocialStore;
use reel_engine::user::UserProfile;
use reel_engine::{build_scorers, GameConfig, UserId};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn minutes(value: i64) -> Duration {
    Duration::minutes(value)
}

pub fn test_key() -> FairnessKey {
    FairnessKey::from_bytes([7u8; 32])
}

pub fn other_key() -> FairnessKey {
    FairnessKey::from_bytes([9u8; 32])
}

/// Keeps every notification; optionally fails each delivery after recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds_for(&self, user_id: UserId) -> Vec<NotificationKind> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.user_id == user_id)
            .map(|notification| notification.kind)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> EngineResult<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(EngineError::Notification("mail relay down".to_string()));
        }
        Ok(())
    }
}

pub fn game_manager(
    store: Arc<GameStore>,
    key: FairnessKey,
    notifier: Arc<RecordingNotifier>,
) -> GameLifecycleManager {
    GameLifecycleManager::new(
        store,
        GameFairnessEngine::new(key),
        notifier,
        GameConfig::default(),
    )
}

pub fn engagement_service(config: &EngineConfig) -> EngagementService {
    EngagementService::new(Arc::new(SocialStore::in_memory()), build_scorers(config))
        .with_random(ScriptedRandom::floor())
}

/// Registers users `1..=count` with usernames `user{id}`.
pub async fn seed_users(service: &EngagementService, count: u64) {
    for user_id in 1..=count {
        service
            .register_user(UserProfile::new(user_id, format!("user{}", user_id)))
            .await
            .unwrap();
    }
}
