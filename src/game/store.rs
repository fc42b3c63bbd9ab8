use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::game::models::{Game, GameHistory, GameSubmission, RewardMessage, WinnerRecord};
use crate::store::{load_json, persist_json};
use crate::{Activatable, GameId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct GameLedger {
    next_game_id: GameId,
    next_winner_id: u64,
    games: BTreeMap<GameId, Game>,
    submissions: Vec<GameSubmission>,
    winners: BTreeMap<u64, WinnerRecord>,
    messages: Vec<RewardMessage>,
    histories: BTreeMap<GameId, GameHistory>,
}

/// Outcome of trying to move a game out of `Open`.
#[derive(Debug, Clone)]
pub enum CloseGate {
    /// This caller closed the game and owns winner selection.
    Acquired(Game),
    /// Another trigger already closed the game.
    AlreadyClosed(Game),
    /// Soft-deleted, never closed.
    Inactive,
    /// Scheduled trigger before `end_time`, or auto-close is off.
    NotDue,
}

/// Everything persisted when winners are selected.
#[derive(Debug, Clone)]
pub struct WinnerSelection {
    pub winners: Vec<WinnerRecord>,
    pub history: GameHistory,
    pub opening_message: String,
    pub selected_at: DateTime<Utc>,
}

pub struct GameStore {
    path: Option<PathBuf>,
    state: RwLock<GameLedger>,
}

impl GameStore {
    pub async fn load(path: PathBuf) -> EngineResult<Self> {
        let state = load_json(&path, "game state").await?;
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(GameLedger::default()),
        }
    }

    /// Stores a new game under a freshly allocated id.
    pub async fn insert_game(&self, mut game: Game) -> EngineResult<Game> {
        let mut guard = self.state.write().await;
        guard.next_game_id += 1;
        game.id = guard.next_game_id;
        guard.games.insert(game.id, game.clone());
        self.persist(&guard).await?;
        Ok(game)
    }

    pub async fn game(&self, game_id: GameId) -> EngineResult<Game> {
        let guard = self.state.read().await;
        guard
            .games
            .get(&game_id)
            .cloned()
            .ok_or_else(|| game_not_found(game_id))
    }

    pub async fn games(&self) -> Vec<Game> {
        let guard = self.state.read().await;
        guard.games.values().cloned().collect()
    }

    /// Soft delete. Games with participants cannot be deleted.
    pub async fn deactivate_game(&self, game_id: GameId) -> EngineResult<Game> {
        let mut guard = self.state.write().await;
        let has_submissions = guard.submissions.iter().any(|sub| sub.game_id == game_id);
        let game = guard
            .games
            .get_mut(&game_id)
            .ok_or_else(|| game_not_found(game_id))?;
        if has_submissions {
            return Err(EngineError::Validation(
                "cannot delete a game with participants".to_string(),
            ));
        }
        game.deactivate();
        let updated = game.clone();
        self.persist(&guard).await?;
        Ok(updated)
    }

    /// Insert-if-absent on (game, user); the open and range checks run in
    /// the same critical section.
    pub async fn insert_submission(&self, submission: GameSubmission) -> EngineResult<GameSubmission> {
        let mut guard = self.state.write().await;
        let game = guard
            .games
            .get(&submission.game_id)
            .ok_or_else(|| game_not_found(submission.game_id))?;

        if !game.accepts_submissions(submission.submitted_at) {
            return Err(EngineError::GameNotOpen(format!(
                "game {} no longer accepts submissions",
                game.id
            )));
        }
        if !game.in_range(submission.guessed_value) {
            return Err(EngineError::Validation(format!(
                "guess {} is outside {}..={}",
                submission.guessed_value, game.guess_min, game.guess_max
            )));
        }
        if guard
            .submissions
            .iter()
            .any(|sub| sub.game_id == submission.game_id && sub.user_id == submission.user_id)
        {
            return Err(EngineError::Duplicate(format!(
                "user {} already submitted to game {}",
                submission.user_id, submission.game_id
            )));
        }

        guard.submissions.push(submission.clone());
        self.persist(&guard).await?;
        Ok(submission)
    }

    /// Submissions of one game, earliest first. Ties keep insertion order.
    pub async fn submissions(&self, game_id: GameId) -> Vec<GameSubmission> {
        let guard = self.state.read().await;
        let mut submissions: Vec<GameSubmission> = guard
            .submissions
            .iter()
            .filter(|sub| sub.game_id == game_id)
            .cloned()
            .collect();
        submissions.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        submissions
    }

    pub async fn participant_count(&self, game_id: GameId) -> usize {
        let guard = self.state.read().await;
        guard.submissions.iter().filter(|sub| sub.game_id == game_id).count()
    }

    /// Check-and-set on the open flags. Only one concurrent caller gets
    /// `Acquired` for a given game.
    pub async fn begin_close(
        &self,
        game_id: GameId,
        now: DateTime<Utc>,
        scheduled: bool,
    ) -> EngineResult<CloseGate> {
        let mut guard = self.state.write().await;
        let game = guard
            .games
            .get_mut(&game_id)
            .ok_or_else(|| game_not_found(game_id))?;

        if game.closed_at.is_some() || game.winners_selected {
            return Ok(CloseGate::AlreadyClosed(game.clone()));
        }
        if !game.is_active() {
            return Ok(CloseGate::Inactive);
        }
        if scheduled && (!game.auto_close || now < game.end_time) {
            return Ok(CloseGate::NotDue);
        }

        game.deactivate();
        game.closed_at = Some(now);
        let closed = game.clone();
        self.persist(&guard).await?;
        Ok(CloseGate::Acquired(closed))
    }

    /// Persists winners, their opening messages and the history snapshot,
    /// then flags the game. Returns `None` when winners already exist.
    pub async fn record_winners(
        &self,
        game_id: GameId,
        selection: WinnerSelection,
    ) -> EngineResult<Option<Vec<WinnerRecord>>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let game = state
            .games
            .get_mut(&game_id)
            .ok_or_else(|| game_not_found(game_id))?;
        if game.winners_selected {
            return Ok(None);
        }
        game.winners_selected = true;
        let creator_id = game.creator_id;

        let mut stored = Vec::with_capacity(selection.winners.len());
        for mut winner in selection.winners {
            state.next_winner_id += 1;
            winner.id = state.next_winner_id;

            if let Some(submission) = state
                .submissions
                .iter_mut()
                .find(|sub| sub.game_id == game_id && sub.user_id == winner.user_id)
            {
                submission.is_winner = true;
                submission.prize_position = Some(winner.prize_position);
            }

            state.messages.push(RewardMessage {
                winner_id: winner.id,
                sender_id: creator_id,
                message: selection.opening_message.clone(),
                created_at: selection.selected_at,
            });
            state.winners.insert(winner.id, winner.clone());
            stored.push(winner);
        }
        state.histories.insert(game_id, selection.history);

        self.persist(state).await?;
        Ok(Some(stored))
    }

    pub async fn winner(&self, winner_id: u64) -> EngineResult<WinnerRecord> {
        let guard = self.state.read().await;
        guard
            .winners
            .get(&winner_id)
            .cloned()
            .ok_or_else(|| winner_not_found(winner_id))
    }

    pub async fn winners_for_game(&self, game_id: GameId) -> Vec<WinnerRecord> {
        let guard = self.state.read().await;
        let mut winners: Vec<WinnerRecord> = guard
            .winners
            .values()
            .filter(|winner| winner.game_id == game_id)
            .cloned()
            .collect();
        winners.sort_by_key(|winner| winner.prize_position);
        winners
    }

    /// Applies `change` to a winner record atomically. Nothing is written
    /// when `change` fails.
    pub async fn update_winner<F>(&self, winner_id: u64, change: F) -> EngineResult<WinnerRecord>
    where
        F: FnOnce(&mut WinnerRecord) -> EngineResult<()>,
    {
        let mut guard = self.state.write().await;
        let winner = guard
            .winners
            .get_mut(&winner_id)
            .ok_or_else(|| winner_not_found(winner_id))?;
        let mut draft = winner.clone();
        change(&mut draft)?;
        *winner = draft.clone();
        self.persist(&guard).await?;
        Ok(draft)
    }

    pub async fn append_message<F>(&self, winner_id: u64, build: F) -> EngineResult<RewardMessage>
    where
        F: FnOnce(&WinnerRecord) -> EngineResult<RewardMessage>,
    {
        let mut guard = self.state.write().await;
        let winner = guard
            .winners
            .get(&winner_id)
            .ok_or_else(|| winner_not_found(winner_id))?;
        let message = build(winner)?;
        guard.messages.push(message.clone());
        self.persist(&guard).await?;
        Ok(message)
    }

    pub async fn messages(&self, winner_id: u64) -> Vec<RewardMessage> {
        let guard = self.state.read().await;
        guard
            .messages
            .iter()
            .filter(|message| message.winner_id == winner_id)
            .cloned()
            .collect()
    }

    pub async fn history(&self, game_id: GameId) -> Option<GameHistory> {
        let guard = self.state.read().await;
        guard.histories.get(&game_id).cloned()
    }

    /// Active auto-close games whose end time has passed.
    pub async fn due_games(&self, now: DateTime<Utc>) -> Vec<GameId> {
        let guard = self.state.read().await;
        guard
            .games
            .values()
            .filter(|game| {
                game.is_active() && game.auto_close && game.closed_at.is_none() && game.end_time <= now
            })
            .map(|game| game.id)
            .collect()
    }

    async fn persist(&self, state: &GameLedger) -> EngineResult<()> {
        match self.path.as_ref() {
            Some(path) => persist_json(path, state, "game state").await,
            None => Ok(()),
        }
    }
}

fn game_not_found(game_id: GameId) -> EngineError {
    EngineError::NotFound(format!("game {}", game_id))
}

fn winner_not_found(winner_id: u64) -> EngineError {
    EngineError::NotFound(format!("winner record {}", winner_id))
}
