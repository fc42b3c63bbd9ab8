use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reel_engine::content::ContentItem;
use reel_engine::game::{Game, GameState, RewardType};
use reel_engine::user::UserProfile;
use reel_engine::{EngineError, ItemId, UserId};

#[derive(Debug, Deserialize)]
pub struct ApiFeedQuery {
    pub viewer_id: UserId,
    pub last_seen: Option<ItemId>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPublishRequest {
    pub id: ItemId,
    pub creator_id: UserId,
    pub caption: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ApiPublishRequest {
    pub fn into_item(self, now: DateTime<Utc>) -> ContentItem {
        let caption = self.caption.unwrap_or_default().trim().to_string();
        ContentItem::new(self.id, self.creator_id, caption, now).with_tags(
            self.tags
                .unwrap_or_default()
                .into_iter()
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty()),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiRegisterRequest {
    pub user_id: UserId,
    pub username: String,
    pub tags: Option<Vec<String>>,
}

impl ApiRegisterRequest {
    pub fn into_profile(self) -> UserProfile {
        let mut profile = UserProfile::new(self.user_id, self.username);
        profile.engaged_tags = self
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        profile
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiFollowRequest {
    pub creator_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct ApiFollowResponse {
    pub follower_id: UserId,
    pub creator_id: UserId,
    pub created: bool,
}

/// Body for actions taken by one user (share, hide, delete, claim, deliver).
#[derive(Debug, Deserialize)]
pub struct ApiUserAction {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ApiCreateGameRequest {
    pub creator_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub reward_type: String,
    pub number_of_winners: Option<u32>,
    pub guess_min: Option<u32>,
    pub guess_max: Option<u32>,
    pub reel_id: Option<ItemId>,
    pub duration_hours: Option<i64>,
    pub auto_close: Option<bool>,
}

impl ApiCreateGameRequest {
    pub fn into_new_game(self) -> Result<reel_engine::game::NewGame, EngineError> {
        let reward_type = RewardType::from_str(&self.reward_type).ok_or_else(|| {
            EngineError::Validation(format!("invalid reward type: {}", self.reward_type))
        })?;
        Ok(reel_engine::game::NewGame {
            creator_id: self.creator_id,
            title: self.title,
            description: self.description,
            reward_type,
            number_of_winners: self.number_of_winners.unwrap_or(1),
            guess_min: self.guess_min.unwrap_or(1),
            guess_max: self.guess_max.unwrap_or(100),
            reel_id: self.reel_id,
            duration_hours: self.duration_hours,
            auto_close: self.auto_close.unwrap_or(true),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiSubmitRequest {
    pub user_id: UserId,
    pub guessed_value: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiVerifyRequest {
    pub values: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessageRequest {
    pub user_id: UserId,
    pub message: String,
}

/// Public view of a game. The salt stays hidden while the game is open.
#[derive(Debug, Serialize)]
pub struct ApiGameView {
    pub id: u64,
    pub creator_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub reward_type: RewardType,
    pub number_of_winners: u32,
    pub guess_min: u32,
    pub guess_max: u32,
    pub state: GameState,
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub hash_commit: String,
    pub salt: Option<String>,
    pub participants: usize,
}

impl ApiGameView {
    pub fn from_game(game: Game, participants: usize) -> Self {
        let state = game.state();
        let salt = (state != GameState::Open).then(|| game.salt.clone());
        Self {
            id: game.id,
            creator_id: game.creator_id,
            title: game.title,
            description: game.description,
            reward_type: game.reward_type,
            number_of_winners: game.number_of_winners,
            guess_min: game.guess_min,
            guess_max: game.guess_max,
            state,
            created_at: game.created_at,
            end_time: game.end_time,
            hash_commit: game.hash_commit,
            salt,
            participants,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiRevealResponse {
    pub game_id: u64,
    pub values: Vec<u32>,
    pub salt: String,
    pub hash_commit: String,
}

#[derive(Debug, Serialize)]
pub struct ApiVerifyResponse {
    pub game_id: u64,
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub kind: String,
}

impl ApiErrorBody {
    pub fn from_error(err: &EngineError) -> Self {
        Self {
            error: err.to_string(),
            kind: format!("{:?}", err.kind()),
        }
    }
}
