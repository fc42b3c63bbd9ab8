use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Activatable, GameId, ItemId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardType {
    Cash,
    Digital,
    Product,
}

impl RewardType {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "cash" => Some(RewardType::Cash),
            "digital" => Some(RewardType::Digital),
            "product" => Some(RewardType::Product),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RewardType::Cash => "cash",
            RewardType::Digital => "digital",
            RewardType::Product => "product",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Open,
    Closed,
    WinnersSelected,
}

/// Parameters for a new game. The commitment is generated by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGame {
    pub creator_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub reward_type: RewardType,
    pub number_of_winners: u32,
    pub guess_min: u32,
    pub guess_max: u32,
    #[serde(default)]
    pub reel_id: Option<ItemId>,
    #[serde(default)]
    pub duration_hours: Option<i64>,
    #[serde(default = "default_auto_close")]
    pub auto_close: bool,
}

fn default_auto_close() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub creator_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub reward_type: RewardType,
    pub number_of_winners: u32,
    pub guess_min: u32,
    pub guess_max: u32,
    pub reel_id: Option<ItemId>,
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub salt: String,
    pub hash_commit: String,
    pub encrypted_winning_values: String,
    pub is_active: bool,
    pub auto_close: bool,
    pub winners_selected: bool,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn state(&self) -> GameState {
        if self.winners_selected {
            GameState::WinnersSelected
        } else if self.closed_at.is_some() {
            GameState::Closed
        } else {
            GameState::Open
        }
    }

    /// Submissions are taken only while active and strictly before `end_time`.
    pub fn accepts_submissions(&self, now: DateTime<Utc>) -> bool {
        self.state() == GameState::Open && self.is_active && now < self.end_time
    }

    pub fn in_range(&self, value: u32) -> bool {
        (self.guess_min..=self.guess_max).contains(&value)
    }
}

impl Activatable for Game {
    fn is_active(&self) -> bool {
        self.is_active
    }

    fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSubmission {
    pub game_id: GameId,
    pub user_id: UserId,
    pub guessed_value: u32,
    pub submitted_at: DateTime<Utc>,
    pub is_winner: bool,
    pub prize_position: Option<u32>,
}

impl GameSubmission {
    pub fn new(game_id: GameId, user_id: UserId, guessed_value: u32, submitted_at: DateTime<Utc>) -> Self {
        Self {
            game_id,
            user_id,
            guessed_value,
            submitted_at,
            is_winner: false,
            prize_position: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerState {
    PendingClaim,
    Claimed,
    Delivered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub id: u64,
    pub game_id: GameId,
    pub user_id: UserId,
    pub number: u32,
    pub prize_position: u32,
    pub reward_type: RewardType,
    pub reward_description: Option<String>,
    pub claim_deadline: DateTime<Utc>,
    pub delivery_deadline: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub is_claimed: bool,
    pub delivered: bool,
}

impl WinnerRecord {
    pub fn state(&self) -> WinnerState {
        if self.delivered {
            WinnerState::Delivered
        } else if self.is_claimed {
            WinnerState::Claimed
        } else {
            WinnerState::PendingClaim
        }
    }

    /// Last instant a reward message may be posted.
    pub fn messaging_deadline(&self) -> DateTime<Utc> {
        self.delivery_deadline
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardMessage {
    pub winner_id: u64,
    pub sender_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of a game taken when its winners are selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameHistory {
    pub game_id: GameId,
    pub creator_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub reward_type: RewardType,
    pub number_of_winners: u32,
    pub guess_min: u32,
    pub guess_max: u32,
    pub reel_id: Option<ItemId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub revealed_values: Vec<u32>,
    pub participant_count: usize,
}
