mod common;

use chrono::Duration;
use std::sync::Arc;

use common::{game_manager, minutes, other_key, t0, test_key, RecordingNotifier};
use reel_engine::game::{
    CloseOutcome, CloseReport, CloseTrigger, Game, GameFairnessEngine, GameLifecycleManager,
    GameState, GameStore, NewGame, RewardType, WinnerState,
};
use reel_engine::notify::NotificationKind;
use reel_engine::EngineError;

const CREATOR: u64 = 1;

fn new_game(winners: u32, min: u32, max: u32) -> NewGame {
    NewGame {
        creator_id: CREATOR,
        title: "Guess the jar".to_string(),
        description: Some("Signed poster".to_string()),
        reward_type: RewardType::Product,
        number_of_winners: winners,
        guess_min: min,
        guess_max: max,
        reel_id: None,
        duration_hours: Some(24),
        auto_close: true,
    }
}

fn setup() -> (GameLifecycleManager, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let manager = game_manager(Arc::new(GameStore::in_memory()), test_key(), notifier.clone());
    (manager, notifier)
}

fn committed(game: &Game) -> Vec<u32> {
    GameFairnessEngine::new(test_key())
        .decrypt(&game.encrypted_winning_values)
        .unwrap()
}

fn uncommitted(game: &Game, count: usize) -> Vec<u32> {
    let values = committed(game);
    (game.guess_min..=game.guess_max)
        .filter(|value| !values.contains(value))
        .take(count)
        .collect()
}

fn expect_report(outcome: CloseOutcome) -> CloseReport {
    match outcome {
        CloseOutcome::WinnersSelected(report) => report,
        other => panic!("expected winners, got {:?}", other),
    }
}

#[tokio::test]
async fn create_game_validates_parameters() {
    let (manager, _) = setup();

    let err = manager.create_game(new_game(1, 10, 5), t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager.create_game(new_game(0, 1, 10), t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager.create_game(new_game(11, 1, 10), t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Range(_)));

    let mut untitled = new_game(1, 1, 10);
    untitled.title = "   ".to_string();
    let err = manager.create_game(untitled, t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert!(manager.store().games().await.is_empty());
}

#[tokio::test]
async fn create_game_requires_positive_open_range() {
    let (manager, _) = setup();

    let err = manager.create_game(new_game(1, 0, 10), t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager.create_game(new_game(1, 5, 5), t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let game = manager.create_game(new_game(2, 1, 2), t0()).await.unwrap();
    let mut values = committed(&game);
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
}

#[tokio::test]
async fn create_game_rejects_oversized_requests() {
    let (manager, _) = setup();

    let mut forever = new_game(1, 1, 10);
    forever.duration_hours = Some(i64::MAX / 2);
    let err = manager.create_game(forever, t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let mut past_cap = new_game(1, 1, 10);
    past_cap.duration_hours = Some(24 * 90 + 1);
    let err = manager.create_game(past_cap, t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager
        .create_game(new_game(1_000_000, 1, u32::MAX), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let mut longest = new_game(1_000, 1, 5_000);
    longest.duration_hours = Some(24 * 90);
    let game = manager.create_game(longest, t0()).await.unwrap();
    assert_eq!(game.end_time, t0() + Duration::days(90));
    assert_eq!(manager.store().games().await.len(), 1);
}

#[tokio::test]
async fn create_game_publishes_commitment() {
    let (manager, _) = setup();
    let mut request = new_game(3, 1, 50);
    request.duration_hours = None;
    let game = manager.create_game(request, t0()).await.unwrap();

    assert_eq!(game.state(), GameState::Open);
    assert_eq!(game.end_time, t0() + Duration::hours(24));
    assert_eq!(game.hash_commit.len(), 64);
    assert_eq!(game.salt.len(), 32);

    let values = committed(&game);
    assert_eq!(values.len(), 3);
    assert!(values.iter().all(|value| (1..=50).contains(value)));
    assert!(GameFairnessEngine::verify(&values, &game.salt, &game.hash_commit));
    assert!(manager.verify_game(game.id, &values).await.unwrap());
}

#[tokio::test]
async fn submissions_are_unique_and_in_range() {
    let (manager, _) = setup();
    let game = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();

    manager.submit_guess(game.id, 2, 4, t0() + minutes(1)).await.unwrap();

    let err = manager
        .submit_guess(game.id, 2, 5, t0() + minutes(2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Duplicate(_)));

    let err = manager
        .submit_guess(game.id, 3, 11, t0() + minutes(2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let submissions = manager.store().submissions(game.id).await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].guessed_value, 4);
}

#[tokio::test]
async fn submissions_stop_at_end_time() {
    let (manager, _) = setup();
    let game = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();

    manager
        .submit_guess(game.id, 2, 1, game.end_time - Duration::seconds(1))
        .await
        .unwrap();
    let err = manager
        .submit_guess(game.id, 3, 2, game.end_time)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GameNotOpen(_)));
}

#[tokio::test]
async fn closed_games_reject_submissions() {
    let (manager, _) = setup();
    let game = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();
    manager
        .close_game(game.id, t0() + minutes(5), CloseTrigger::Manual)
        .await
        .unwrap();

    let err = manager
        .submit_guess(game.id, 2, 3, t0() + minutes(6))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GameNotOpen(_)));
}

#[tokio::test]
async fn exact_matches_win_before_backfill() {
    let (manager, notifier) = setup();
    let game = manager.create_game(new_game(3, 1, 100), t0()).await.unwrap();
    let values = committed(&game);
    let misses = uncommitted(&game, 3);

    manager.submit_guess(game.id, 10, misses[0], t0() + minutes(1)).await.unwrap();
    manager.submit_guess(game.id, 11, values[1], t0() + minutes(2)).await.unwrap();
    manager.submit_guess(game.id, 12, misses[1], t0() + minutes(3)).await.unwrap();
    manager.submit_guess(game.id, 13, misses[2], t0() + minutes(4)).await.unwrap();

    let close_at = game.end_time + minutes(1);
    let report = expect_report(
        manager
            .close_game(game.id, close_at, CloseTrigger::Scheduled)
            .await
            .unwrap(),
    );

    assert_eq!(report.revealed_values, values);
    let picked: Vec<(u64, u32, u32)> = report
        .winners
        .iter()
        .map(|winner| (winner.user_id, winner.number, winner.prize_position))
        .collect();
    assert_eq!(
        picked,
        vec![(11, values[1], 1), (10, misses[0], 2), (12, misses[1], 3)]
    );

    for winner in &report.winners {
        assert_eq!(winner.claim_deadline, close_at + Duration::days(14));
        assert_eq!(winner.delivery_deadline, close_at + Duration::days(21));
        assert_eq!(winner.state(), WinnerState::PendingClaim);
        assert_eq!(manager.store().messages(winner.id).await.len(), 1);
    }

    assert_eq!(report.notifications_sent, 4);
    assert_eq!(report.notifications_failed, 0);
    assert_eq!(notifier.kinds_for(11), vec![NotificationKind::WinnerAnnouncement]);
    assert_eq!(notifier.kinds_for(CREATOR), vec![NotificationKind::CreatorGameClosed]);
    assert!(notifier.kinds_for(13).is_empty());

    let closed = manager.store().game(game.id).await.unwrap();
    assert_eq!(closed.state(), GameState::WinnersSelected);
    let history = manager.store().history(game.id).await.unwrap();
    assert_eq!(history.participant_count, 4);
    assert_eq!(history.revealed_values, values);
}

#[tokio::test]
async fn backfill_is_capped_by_participants() {
    let (manager, _) = setup();
    let game = manager.create_game(new_game(3, 1, 100), t0()).await.unwrap();
    let misses = uncommitted(&game, 1);
    manager.submit_guess(game.id, 20, misses[0], t0() + minutes(1)).await.unwrap();

    let report = expect_report(
        manager
            .close_game(game.id, t0() + minutes(2), CloseTrigger::Manual)
            .await
            .unwrap(),
    );
    assert_eq!(report.winners.len(), 1);
    assert_eq!(report.winners[0].user_id, 20);
    assert_eq!(report.winners[0].prize_position, 1);
}

#[tokio::test]
async fn closing_twice_is_a_noop() {
    let (manager, notifier) = setup();
    let game = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();
    manager.submit_guess(game.id, 2, 3, t0() + minutes(1)).await.unwrap();

    let first = manager
        .close_game(game.id, game.end_time, CloseTrigger::Scheduled)
        .await
        .unwrap();
    assert!(matches!(first, CloseOutcome::WinnersSelected(_)));
    let sent = notifier.sent().len();

    let second = manager
        .close_game(game.id, game.end_time + minutes(1), CloseTrigger::Manual)
        .await
        .unwrap();
    assert!(matches!(second, CloseOutcome::AlreadyProcessed));

    let retry = manager.select_winners(game.id, game.end_time + minutes(2)).await.unwrap();
    assert!(matches!(retry, CloseOutcome::AlreadyProcessed));

    assert_eq!(manager.store().winners_for_game(game.id).await.len(), 1);
    assert_eq!(notifier.sent().len(), sent);
}

#[tokio::test]
async fn scheduled_close_waits_for_end_time() {
    let (manager, _) = setup();
    let game = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();

    let outcome = manager
        .close_game(game.id, game.end_time - minutes(1), CloseTrigger::Scheduled)
        .await
        .unwrap();
    assert!(matches!(outcome, CloseOutcome::NotDue));
    assert_eq!(
        manager.store().game(game.id).await.unwrap().state(),
        GameState::Open
    );
}

#[tokio::test]
async fn failed_reveal_leaves_game_closed() {
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(GameStore::in_memory());
    let manager = game_manager(store.clone(), test_key(), notifier.clone());
    let misconfigured = game_manager(store.clone(), other_key(), notifier.clone());

    let game = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();
    manager.submit_guess(game.id, 2, 3, t0() + minutes(1)).await.unwrap();

    let err = misconfigured
        .close_game(game.id, game.end_time, CloseTrigger::Scheduled)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Decrypt(_)));

    let stuck = store.game(game.id).await.unwrap();
    assert_eq!(stuck.state(), GameState::Closed);
    assert!(store.winners_for_game(game.id).await.is_empty());
    assert!(notifier.sent().is_empty());

    let report = expect_report(manager.select_winners(game.id, game.end_time).await.unwrap());
    assert_eq!(report.winners.len(), 1);
    assert_eq!(
        store.game(game.id).await.unwrap().state(),
        GameState::WinnersSelected
    );
}

#[tokio::test]
async fn failing_notifier_does_not_block_selection() {
    let notifier = Arc::new(RecordingNotifier::failing());
    let manager = game_manager(Arc::new(GameStore::in_memory()), test_key(), notifier.clone());
    let game = manager.create_game(new_game(2, 1, 100), t0()).await.unwrap();
    manager.submit_guess(game.id, 2, 1, t0() + minutes(1)).await.unwrap();
    manager.submit_guess(game.id, 3, 2, t0() + minutes(2)).await.unwrap();

    let report = expect_report(
        manager
            .close_game(game.id, game.end_time, CloseTrigger::Scheduled)
            .await
            .unwrap(),
    );
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(report.notifications_failed, report.winners.len() + 1);
    assert_eq!(
        manager.store().game(game.id).await.unwrap().state(),
        GameState::WinnersSelected
    );
}

async fn closed_with_winner(manager: &GameLifecycleManager) -> (Game, u64) {
    let game = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();
    manager.submit_guess(game.id, 2, 5, t0() + minutes(1)).await.unwrap();
    let report = expect_report(
        manager
            .close_game(game.id, game.end_time, CloseTrigger::Scheduled)
            .await
            .unwrap(),
    );
    (game, report.winners[0].id)
}

#[tokio::test]
async fn claim_respects_deadline() {
    let (manager, notifier) = setup();
    let (_, winner_id) = closed_with_winner(&manager).await;
    let winner = manager.store().winner(winner_id).await.unwrap();

    let err = manager
        .claim_reward(winner_id, 2, winner.claim_deadline + Duration::seconds(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Expired(ref period) if period == "Claim"));
    assert!(!manager.store().winner(winner_id).await.unwrap().is_claimed);

    let err = manager
        .claim_reward(winner_id, 99, winner.claim_deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let claim_at = winner.claim_deadline - Duration::seconds(1);
    let claimed = manager.claim_reward(winner_id, 2, claim_at).await.unwrap();
    assert_eq!(claimed.state(), WinnerState::Claimed);
    assert_eq!(claimed.claimed_at, Some(claim_at));
    assert_eq!(claimed.delivery_deadline, claim_at + Duration::days(7));
    assert!(notifier
        .kinds_for(CREATOR)
        .contains(&NotificationKind::RewardClaimed));

    let err = manager.claim_reward(winner_id, 2, claim_at).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyClaimed));

    let messages = manager.store().messages(winner_id).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].sender_id, 2);
}

#[tokio::test]
async fn delivery_requires_claim_and_deadline() {
    let (manager, notifier) = setup();
    let (game, winner_id) = closed_with_winner(&manager).await;
    let claim_at = game.end_time + Duration::days(1);

    let err = manager
        .mark_delivered(winner_id, CREATOR, claim_at)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotClaimed));

    let claimed = manager.claim_reward(winner_id, 2, claim_at).await.unwrap();

    let err = manager
        .mark_delivered(winner_id, 2, claim_at + minutes(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager
        .mark_delivered(winner_id, CREATOR, claimed.delivery_deadline + Duration::seconds(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Expired(ref period) if period == "Delivery"));

    let delivered = manager
        .mark_delivered(winner_id, CREATOR, claimed.delivery_deadline)
        .await
        .unwrap();
    assert_eq!(delivered.state(), WinnerState::Delivered);
    assert_eq!(notifier.kinds_for(2).last(), Some(&NotificationKind::RewardDelivered));

    let err = manager
        .mark_delivered(winner_id, CREATOR, claimed.delivery_deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyDelivered));
}

#[tokio::test]
async fn messaging_closes_after_delivery_deadline() {
    let (manager, _) = setup();
    let (_, winner_id) = closed_with_winner(&manager).await;
    let winner = manager.store().winner(winner_id).await.unwrap();

    let posted = manager
        .post_message(winner_id, 2, "Address sent".to_string(), winner.delivery_deadline)
        .await
        .unwrap();
    assert_eq!(posted.sender_id, 2);
    manager
        .post_message(winner_id, CREATOR, "Shipping Monday".to_string(), winner.delivery_deadline)
        .await
        .unwrap();

    let err = manager
        .post_message(winner_id, 42, "hello".to_string(), winner.delivery_deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager
        .post_message(winner_id, 2, "  ".to_string(), winner.delivery_deadline)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager
        .post_message(
            winner_id,
            2,
            "Still there?".to_string(),
            winner.delivery_deadline + Duration::seconds(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MessagingExpired));
    assert_eq!(manager.store().messages(winner_id).await.len(), 3);
}

#[tokio::test]
async fn values_stay_sealed_while_open() {
    let (manager, _) = setup();
    let game = manager.create_game(new_game(2, 1, 20), t0()).await.unwrap();

    let err = manager.revealed_values(game.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotRevealed(_)));
    let err = manager.select_winners(game.id, t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotRevealed(_)));

    manager
        .close_game(game.id, t0() + minutes(1), CloseTrigger::Manual)
        .await
        .unwrap();
    let revealed = manager.revealed_values(game.id).await.unwrap();
    assert_eq!(revealed, committed(&game));
    assert!(manager.verify_game(game.id, &revealed).await.unwrap());

    let mut forged = revealed.clone();
    forged[0] = forged[0] % 20 + 1;
    assert!(!manager.verify_game(game.id, &forged).await.unwrap());
}

#[tokio::test]
async fn delete_requires_creator_and_no_participants() {
    let (manager, _) = setup();
    let empty = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();
    let busy = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();
    manager.submit_guess(busy.id, 2, 3, t0() + minutes(1)).await.unwrap();

    let err = manager.delete_game(empty.id, 2).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = manager.delete_game(busy.id, CREATOR).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let deleted = manager.delete_game(empty.id, CREATOR).await.unwrap();
    assert!(!deleted.is_active);

    let outcome = manager
        .close_game(empty.id, empty.end_time, CloseTrigger::Scheduled)
        .await
        .unwrap();
    assert!(matches!(outcome, CloseOutcome::Inactive));
}

#[tokio::test]
async fn sweep_closes_only_due_games() {
    let (manager, _) = setup();
    let due = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();

    let mut later = new_game(1, 1, 10);
    later.duration_hours = Some(48);
    let later = manager.create_game(later, t0()).await.unwrap();

    let mut manual = new_game(1, 1, 10);
    manual.auto_close = false;
    let manual = manager.create_game(manual, t0()).await.unwrap();

    let sweep_at = t0() + Duration::hours(25);
    let report = manager.close_expired(sweep_at).await;
    assert_eq!(report.closed, vec![due.id]);
    assert!(report.failed.is_empty());

    let store = manager.store();
    assert_eq!(store.game(due.id).await.unwrap().state(), GameState::WinnersSelected);
    assert_eq!(store.game(later.id).await.unwrap().state(), GameState::Open);
    assert_eq!(store.game(manual.id).await.unwrap().state(), GameState::Open);

    let again = manager.close_expired(sweep_at).await;
    assert!(again.closed.is_empty());
}

#[tokio::test]
async fn sweep_reports_failures_and_continues() {
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(GameStore::in_memory());
    let manager = game_manager(store.clone(), test_key(), notifier.clone());
    let misconfigured = game_manager(store.clone(), other_key(), notifier);

    let sealed_elsewhere = misconfigured
        .create_game(new_game(1, 1, 10), t0())
        .await
        .unwrap();
    let healthy = manager.create_game(new_game(1, 1, 10), t0()).await.unwrap();

    let report = manager.close_expired(t0() + Duration::hours(25)).await;
    assert_eq!(report.closed, vec![healthy.id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, sealed_elsewhere.id);
}
