use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::GameConfig;
use crate::error::{EngineError, EngineResult};
use crate::game::fairness::GameFairnessEngine;
use crate::game::models::{
    Game, GameHistory, GameState, GameSubmission, NewGame, RewardMessage, WinnerRecord,
};
use crate::game::store::{CloseGate, GameStore, WinnerSelection};
use crate::notify::{dispatch, Notification, NotificationKind, Notifier};
use crate::{GameId, UserId};

const OPENING_MESSAGE: &str =
    "Reward claiming is now open. Please share delivery details or proof here.";
const CLAIM_MESSAGE: &str = "I have claimed my reward.";
const DELIVERY_MESSAGE: &str = "Reward has been delivered by the creator.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseTrigger {
    /// `end_time` elapsed, picked up by the sweep.
    Scheduled,
    /// Operator or creator closed the game by hand.
    Manual,
}

impl CloseTrigger {
    pub fn label(self) -> &'static str {
        match self {
            CloseTrigger::Scheduled => "scheduled",
            CloseTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseReport {
    pub game_id: GameId,
    pub revealed_values: Vec<u32>,
    pub winners: Vec<WinnerRecord>,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CloseOutcome {
    WinnersSelected(CloseReport),
    /// Closed or selected earlier; nothing was done.
    AlreadyProcessed,
    Inactive,
    NotDue,
}

/// Submission chosen as a winner and the value it won with.
#[derive(Debug, Clone)]
pub struct ResolvedWinner {
    pub submission: GameSubmission,
    pub number: u32,
    pub prize_position: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub closed: Vec<GameId>,
    pub skipped: Vec<GameId>,
    pub failed: Vec<(GameId, String)>,
}

pub struct GameLifecycleManager {
    store: Arc<GameStore>,
    engine: GameFairnessEngine,
    notifier: Arc<dyn Notifier>,
    config: GameConfig,
}

impl GameLifecycleManager {
    pub fn new(
        store: Arc<GameStore>,
        engine: GameFairnessEngine,
        notifier: Arc<dyn Notifier>,
        config: GameConfig,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &Arc<GameStore> {
        &self.store
    }

    /// Validates the parameters, draws and seals the winning values, and
    /// stores the game with its public commitment.
    pub async fn create_game(&self, request: NewGame, now: DateTime<Utc>) -> EngineResult<Game> {
        if request.title.trim().is_empty() {
            return Err(EngineError::Validation("title is required".to_string()));
        }
        if request.guess_min == 0 {
            return Err(EngineError::Validation("guess_min must be at least 1".to_string()));
        }
        if request.guess_max <= request.guess_min {
            return Err(EngineError::Validation(format!(
                "guess_max {} must be greater than guess_min {}",
                request.guess_max, request.guess_min
            )));
        }
        if request.number_of_winners == 0 {
            return Err(EngineError::Validation(
                "number_of_winners must be at least 1".to_string(),
            ));
        }
        if request.number_of_winners > self.config.max_winners {
            return Err(EngineError::Validation(format!(
                "number_of_winners is capped at {}",
                self.config.max_winners
            )));
        }
        let duration = match request.duration_hours {
            Some(hours) if hours <= 0 || hours > self.config.max_duration_hours => {
                return Err(EngineError::Validation(format!(
                    "duration must be within 1..={} hours",
                    self.config.max_duration_hours
                )))
            }
            Some(hours) => Duration::try_hours(hours)
                .ok_or_else(|| EngineError::Validation("duration is out of range".to_string()))?,
            None => self.config.default_duration(),
        };
        let end_time = now
            .checked_add_signed(duration)
            .ok_or_else(|| EngineError::Validation("end time is out of range".to_string()))?;

        let commitment = self.engine.commit(
            request.guess_min,
            request.guess_max,
            request.number_of_winners as usize,
        )?;
        let encrypted = self.engine.encrypt(&commitment.winning_values)?;

        let game = Game {
            id: 0,
            creator_id: request.creator_id,
            title: request.title.trim().to_string(),
            description: request.description,
            reward_type: request.reward_type,
            number_of_winners: request.number_of_winners,
            guess_min: request.guess_min,
            guess_max: request.guess_max,
            reel_id: request.reel_id,
            created_at: now,
            end_time,
            salt: commitment.salt,
            hash_commit: commitment.hash_commit,
            encrypted_winning_values: encrypted,
            is_active: true,
            auto_close: request.auto_close,
            winners_selected: false,
            closed_at: None,
        };
        let game = self.store.insert_game(game).await?;
        info!(
            game_id = game.id,
            creator_id = game.creator_id,
            end_time = %game.end_time,
            hash_commit = %game.hash_commit,
            "game opened"
        );
        Ok(game)
    }

    pub async fn submit_guess(
        &self,
        game_id: GameId,
        user_id: UserId,
        guessed_value: u32,
        now: DateTime<Utc>,
    ) -> EngineResult<GameSubmission> {
        let submission = GameSubmission::new(game_id, user_id, guessed_value, now);
        self.store.insert_submission(submission).await
    }

    /// Moves an open game to `Closed` and then `WinnersSelected`.
    ///
    /// Re-invocation on a game that is already closed is a no-op. When the
    /// reveal fails the game stays `Closed` and the error is returned;
    /// `select_winners` retries selection for such games.
    pub async fn close_game(
        &self,
        game_id: GameId,
        now: DateTime<Utc>,
        trigger: CloseTrigger,
    ) -> EngineResult<CloseOutcome> {
        let scheduled = trigger == CloseTrigger::Scheduled;
        let game = match self.store.begin_close(game_id, now, scheduled).await? {
            CloseGate::Acquired(game) => game,
            CloseGate::AlreadyClosed(_) => {
                debug!(game_id, trigger = trigger.label(), "game already closed");
                return Ok(CloseOutcome::AlreadyProcessed);
            }
            CloseGate::Inactive => return Ok(CloseOutcome::Inactive),
            CloseGate::NotDue => return Ok(CloseOutcome::NotDue),
        };
        info!(game_id, trigger = trigger.label(), "game closed");

        self.select_closed(game, now).await
    }

    /// Winner selection for a game that is closed but has no winners yet.
    pub async fn select_winners(&self, game_id: GameId, now: DateTime<Utc>) -> EngineResult<CloseOutcome> {
        let game = self.store.game(game_id).await?;
        match game.state() {
            GameState::Open => Err(EngineError::NotRevealed(format!(
                "game {} is still open",
                game_id
            ))),
            GameState::WinnersSelected => Ok(CloseOutcome::AlreadyProcessed),
            GameState::Closed => self.select_closed(game, now).await,
        }
    }

    async fn select_closed(&self, game: Game, now: DateTime<Utc>) -> EngineResult<CloseOutcome> {
        let revealed = match self.reveal(&game) {
            Ok(values) => values,
            Err(err) => {
                error!(game_id = game.id, "winner selection aborted: {}", err);
                return Err(err);
            }
        };

        let submissions = self.store.submissions(game.id).await;
        let resolved = reconcile_winners(&game, &revealed, &submissions);
        let selection = self.build_selection(&game, &resolved, &revealed, submissions.len(), now);

        let winners = match self.store.record_winners(game.id, selection).await? {
            Some(winners) => winners,
            None => return Ok(CloseOutcome::AlreadyProcessed),
        };

        let (sent, failed) = self.announce(&game, &winners, submissions.len());
        info!(
            game_id = game.id,
            winners = winners.len(),
            participants = submissions.len(),
            "winners selected"
        );

        Ok(CloseOutcome::WinnersSelected(CloseReport {
            game_id: game.id,
            revealed_values: revealed,
            winners,
            notifications_sent: sent,
            notifications_failed: failed,
        }))
    }

    /// Decrypts the sealed values and checks them against the commitment.
    fn reveal(&self, game: &Game) -> EngineResult<Vec<u32>> {
        let values = self.engine.decrypt(&game.encrypted_winning_values)?;
        if !GameFairnessEngine::verify(&values, &game.salt, &game.hash_commit) {
            return Err(EngineError::Decrypt(
                "revealed values do not match the published commitment".to_string(),
            ));
        }
        Ok(values)
    }

    fn build_selection(
        &self,
        game: &Game,
        resolved: &[ResolvedWinner],
        revealed: &[u32],
        participant_count: usize,
        now: DateTime<Utc>,
    ) -> WinnerSelection {
        let closed_at = game.closed_at.unwrap_or(now);
        let claim_deadline = closed_at + self.config.claim_window();
        let delivery_deadline = claim_deadline + self.config.delivery_window();

        let winners = resolved
            .iter()
            .map(|winner| WinnerRecord {
                id: 0,
                game_id: game.id,
                user_id: winner.submission.user_id,
                number: winner.number,
                prize_position: winner.prize_position,
                reward_type: game.reward_type,
                reward_description: game.description.clone(),
                claim_deadline,
                delivery_deadline,
                claimed_at: None,
                is_claimed: false,
                delivered: false,
            })
            .collect();

        WinnerSelection {
            winners,
            history: GameHistory {
                game_id: game.id,
                creator_id: game.creator_id,
                title: game.title.clone(),
                description: game.description.clone(),
                reward_type: game.reward_type,
                number_of_winners: game.number_of_winners,
                guess_min: game.guess_min,
                guess_max: game.guess_max,
                reel_id: game.reel_id,
                created_at: game.created_at,
                completed_at: now,
                revealed_values: revealed.to_vec(),
                participant_count,
            },
            opening_message: OPENING_MESSAGE.to_string(),
            selected_at: now,
        }
    }

    fn announce(&self, game: &Game, winners: &[WinnerRecord], participants: usize) -> (usize, usize) {
        let mut notifications: Vec<Notification> = winners
            .iter()
            .map(|winner| Notification {
                user_id: winner.user_id,
                kind: NotificationKind::WinnerAnnouncement,
                context: json!({
                    "game_id": game.id,
                    "title": game.title,
                    "reward_type": game.reward_type.label(),
                    "reward_description": game.description,
                    "number": winner.number,
                    "prize_position": winner.prize_position,
                    "claim_deadline": winner.claim_deadline,
                    "delivery_deadline": winner.delivery_deadline,
                }),
            })
            .collect();
        notifications.push(Notification {
            user_id: game.creator_id,
            kind: NotificationKind::CreatorGameClosed,
            context: json!({
                "game_id": game.id,
                "title": game.title,
                "participants": participants,
                "winners": winners.len(),
                "claim_window_days": self.config.claim_window_days,
                "delivery_window_days": self.config.delivery_window_days,
            }),
        });

        let total = notifications.len();
        let sent = notifications
            .into_iter()
            .filter(|notification| dispatch(self.notifier.as_ref(), notification.clone()))
            .count();
        (sent, total - sent)
    }

    /// Closes every due auto-close game. One failing game does not stop the sweep.
    pub async fn close_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for game_id in self.store.due_games(now).await {
            match self.close_game(game_id, now, CloseTrigger::Scheduled).await {
                Ok(CloseOutcome::WinnersSelected(_)) => report.closed.push(game_id),
                Ok(_) => report.skipped.push(game_id),
                Err(err) => {
                    error!(game_id, "failed to close expired game: {}", err);
                    report.failed.push((game_id, err.to_string()));
                }
            }
        }
        if !report.closed.is_empty() || !report.failed.is_empty() {
            info!(
                closed = report.closed.len(),
                failed = report.failed.len(),
                "expired games swept"
            );
        }
        report
    }

    pub async fn claim_reward(
        &self,
        winner_id: u64,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> EngineResult<WinnerRecord> {
        let delivery_window = self.config.delivery_window();
        let winner = self
            .store
            .update_winner(winner_id, |winner| {
                if winner.user_id != user_id {
                    return Err(EngineError::Validation(
                        "only the winner can claim this reward".to_string(),
                    ));
                }
                if winner.is_claimed {
                    return Err(EngineError::AlreadyClaimed);
                }
                if now > winner.claim_deadline {
                    return Err(EngineError::Expired("Claim".to_string()));
                }
                winner.is_claimed = true;
                winner.claimed_at = Some(now);
                winner.delivery_deadline = now + delivery_window;
                Ok(())
            })
            .await?;

        self.store
            .append_message(winner_id, |winner| {
                Ok(RewardMessage {
                    winner_id: winner.id,
                    sender_id: winner.user_id,
                    message: CLAIM_MESSAGE.to_string(),
                    created_at: now,
                })
            })
            .await?;

        let game = self.store.game(winner.game_id).await?;
        dispatch(
            self.notifier.as_ref(),
            Notification {
                user_id: game.creator_id,
                kind: NotificationKind::RewardClaimed,
                context: json!({
                    "game_id": game.id,
                    "title": game.title,
                    "winner_id": winner.id,
                    "winner_user_id": winner.user_id,
                    "delivery_deadline": winner.delivery_deadline,
                }),
            },
        );
        info!(winner_id, game_id = game.id, "reward claimed");
        Ok(winner)
    }

    pub async fn mark_delivered(
        &self,
        winner_id: u64,
        creator_id: UserId,
        now: DateTime<Utc>,
    ) -> EngineResult<WinnerRecord> {
        let current = self.store.winner(winner_id).await?;
        let game = self.store.game(current.game_id).await?;
        if game.creator_id != creator_id {
            return Err(EngineError::Validation(
                "only the game creator can mark a reward as delivered".to_string(),
            ));
        }

        let winner = self
            .store
            .update_winner(winner_id, |winner| {
                if !winner.is_claimed {
                    return Err(EngineError::NotClaimed);
                }
                if now > winner.delivery_deadline {
                    return Err(EngineError::Expired("Delivery".to_string()));
                }
                if winner.delivered {
                    return Err(EngineError::AlreadyDelivered);
                }
                winner.delivered = true;
                Ok(())
            })
            .await?;

        self.store
            .append_message(winner_id, |winner| {
                Ok(RewardMessage {
                    winner_id: winner.id,
                    sender_id: creator_id,
                    message: DELIVERY_MESSAGE.to_string(),
                    created_at: now,
                })
            })
            .await?;

        dispatch(
            self.notifier.as_ref(),
            Notification {
                user_id: winner.user_id,
                kind: NotificationKind::RewardDelivered,
                context: json!({
                    "game_id": game.id,
                    "title": game.title,
                    "winner_id": winner.id,
                }),
            },
        );
        info!(winner_id, game_id = game.id, "reward delivered");
        Ok(winner)
    }

    /// Reward negotiation between winner and creator, open until the
    /// delivery deadline.
    pub async fn post_message(
        &self,
        winner_id: u64,
        sender_id: UserId,
        message: String,
        now: DateTime<Utc>,
    ) -> EngineResult<RewardMessage> {
        if message.trim().is_empty() {
            return Err(EngineError::Validation("message is empty".to_string()));
        }
        let current = self.store.winner(winner_id).await?;
        let game = self.store.game(current.game_id).await?;
        if sender_id != current.user_id && sender_id != game.creator_id {
            return Err(EngineError::Validation(
                "only the winner and the creator can post messages".to_string(),
            ));
        }

        let posted = self
            .store
            .append_message(winner_id, |winner| {
                if now > winner.messaging_deadline() {
                    return Err(EngineError::MessagingExpired);
                }
                Ok(RewardMessage {
                    winner_id: winner.id,
                    sender_id,
                    message,
                    created_at: now,
                })
            })
            .await;
        if let Err(EngineError::MessagingExpired) = &posted {
            warn!(winner_id, sender_id, "message rejected after deadline");
        }
        posted
    }

    /// Decrypted winning values, available once the game has closed.
    pub async fn revealed_values(&self, game_id: GameId) -> EngineResult<Vec<u32>> {
        let game = self.store.game(game_id).await?;
        if game.state() == GameState::Open {
            return Err(EngineError::NotRevealed(format!(
                "game {} is still open",
                game_id
            )));
        }
        if let Some(history) = self.store.history(game_id).await {
            return Ok(history.revealed_values);
        }
        self.reveal(&game)
    }

    /// Audits claimed values against the stored commitment.
    pub async fn verify_game(&self, game_id: GameId, values: &[u32]) -> EngineResult<bool> {
        let game = self.store.game(game_id).await?;
        Ok(GameFairnessEngine::verify(values, &game.salt, &game.hash_commit))
    }

    pub async fn delete_game(&self, game_id: GameId, requester_id: UserId) -> EngineResult<Game> {
        let game = self.store.game(game_id).await?;
        if game.creator_id != requester_id {
            return Err(EngineError::Validation(
                "only the creator can delete a game".to_string(),
            ));
        }
        let game = self.store.deactivate_game(game_id).await?;
        info!(game_id, "game deleted");
        Ok(game)
    }
}

/// Pairs revealed values with submissions.
///
/// Each revealed value goes to the earliest submission that guessed it.
/// Remaining slots are filled from the earliest submissions whose guess
/// matches no revealed value. Only submissions made by `end_time` count.
pub fn reconcile_winners(
    game: &Game,
    revealed: &[u32],
    submissions: &[GameSubmission],
) -> Vec<ResolvedWinner> {
    let wanted = game.number_of_winners as usize;
    let mut eligible: Vec<&GameSubmission> = submissions
        .iter()
        .filter(|sub| sub.game_id == game.id && sub.submitted_at <= game.end_time)
        .collect();
    eligible.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));

    let mut taken: HashSet<UserId> = HashSet::new();
    let mut resolved: Vec<ResolvedWinner> = Vec::new();

    for &value in revealed {
        if resolved.len() >= wanted {
            break;
        }
        if let Some(sub) = eligible
            .iter()
            .find(|sub| sub.guessed_value == value && !taken.contains(&sub.user_id))
        {
            taken.insert(sub.user_id);
            resolved.push(ResolvedWinner {
                submission: (*sub).clone(),
                number: value,
                prize_position: resolved.len() as u32 + 1,
            });
        }
    }

    let committed: HashSet<u32> = revealed.iter().copied().collect();
    for sub in eligible {
        if resolved.len() >= wanted {
            break;
        }
        if taken.contains(&sub.user_id) || committed.contains(&sub.guessed_value) {
            continue;
        }
        taken.insert(sub.user_id);
        resolved.push(ResolvedWinner {
            submission: sub.clone(),
            number: sub.guessed_value,
            prize_position: resolved.len() as u32 + 1,
        });
    }

    resolved
}
