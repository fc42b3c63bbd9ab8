use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::api::{
    ApiCreateGameRequest, ApiErrorBody, ApiFeedQuery, ApiFollowRequest, ApiFollowResponse,
    ApiGameView, ApiMessageRequest, ApiPublishRequest, ApiRegisterRequest, ApiRevealResponse,
    ApiSubmitRequest, ApiUserAction, ApiVerifyRequest, ApiVerifyResponse,
};
use reel_engine::content::ContentItem;
use reel_engine::engagement::{EngagementService, ShareReceipt, ViewReceipt};
use reel_engine::game::{
    CloseOutcome, CloseTrigger, GameLifecycleManager, GameSubmission, RewardMessage, WinnerRecord,
};
use reel_engine::scoring::ScoredCandidate;
use reel_engine::user::UserProfile;
use reel_engine::{EngineError, GameId, ItemId, UserId};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiErrorBody>)>;

#[derive(Clone)]
pub struct AppState {
    pub engagement: Arc<EngagementService>,
    pub games: Arc<GameLifecycleManager>,
}

pub async fn serve(state: AppState, addr: SocketAddr, sweep_every: Option<Duration>) -> Result<(), EngineError> {
    if let Some(period) = sweep_every {
        spawn_sweeper(state.games.clone(), period);
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| EngineError::Config(format!("failed to bind server: {}", err)))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|err| EngineError::Config(format!("server error: {}", err)))?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/users", post(register_handler))
        .route("/api/users/:id/follow", post(follow_handler))
        .route("/api/feed", get(feed_handler))
        .route("/api/items", post(publish_handler))
        .route("/api/items/:id", delete(delete_item_handler))
        .route("/api/items/:id/view", post(view_handler))
        .route("/api/items/:id/share", post(share_handler))
        .route("/api/items/:id/hide", post(hide_handler))
        .route("/api/games", post(create_game_handler))
        .route("/api/games/:id", get(game_handler).delete(delete_game_handler))
        .route("/api/games/:id/submissions", post(submit_handler))
        .route("/api/games/:id/close", post(close_handler))
        .route("/api/games/:id/reveal", get(reveal_handler))
        .route("/api/games/:id/verify", post(verify_handler))
        .route("/api/winners/:id/claim", post(claim_handler))
        .route("/api/winners/:id/deliver", post(deliver_handler))
        .route("/api/winners/:id/messages", post(message_handler))
        .with_state(state)
}

fn spawn_sweeper(games: Arc<GameLifecycleManager>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let report = games.close_expired(Utc::now()).await;
            if !report.failed.is_empty() {
                warn!(failed = report.failed.len(), "expired game sweep had failures");
            }
        }
    });
}

fn reject(err: EngineError) -> (StatusCode, Json<ApiErrorBody>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ApiErrorBody::from_error(&err)))
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<ApiRegisterRequest>,
) -> ApiResult<UserProfile> {
    state
        .engagement
        .register_user(request.into_profile())
        .await
        .map(Json)
        .map_err(reject)
}

async fn follow_handler(
    State(state): State<AppState>,
    Path(follower_id): Path<UserId>,
    Json(request): Json<ApiFollowRequest>,
) -> ApiResult<ApiFollowResponse> {
    let created = state
        .engagement
        .follow(follower_id, request.creator_id)
        .await
        .map_err(reject)?;
    Ok(Json(ApiFollowResponse {
        follower_id,
        creator_id: request.creator_id,
        created,
    }))
}

async fn feed_handler(
    State(state): State<AppState>,
    Query(query): Query<ApiFeedQuery>,
) -> ApiResult<Vec<ScoredCandidate>> {
    state
        .engagement
        .feed(query.viewer_id, query.last_seen, query.limit, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn publish_handler(
    State(state): State<AppState>,
    Json(request): Json<ApiPublishRequest>,
) -> ApiResult<ContentItem> {
    let item = request.into_item(Utc::now());
    state.engagement.publish_item(item).await.map(Json).map_err(reject)
}

async fn view_handler(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
) -> ApiResult<ViewReceipt> {
    state.engagement.record_view(item_id).await.map(Json).map_err(reject)
}

async fn share_handler(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Json(action): Json<ApiUserAction>,
) -> ApiResult<ShareReceipt> {
    state
        .engagement
        .share_item(item_id, action.user_id, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn hide_handler(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Json(action): Json<ApiUserAction>,
) -> Result<StatusCode, (StatusCode, Json<ApiErrorBody>)> {
    state
        .engagement
        .hide_item(action.user_id, item_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(reject)
}

async fn delete_item_handler(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
    Json(action): Json<ApiUserAction>,
) -> ApiResult<ContentItem> {
    state
        .engagement
        .deactivate_item(item_id, action.user_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn create_game_handler(
    State(state): State<AppState>,
    Json(request): Json<ApiCreateGameRequest>,
) -> ApiResult<ApiGameView> {
    let new_game = request.into_new_game().map_err(reject)?;
    let game = state.games.create_game(new_game, Utc::now()).await.map_err(reject)?;
    Ok(Json(ApiGameView::from_game(game, 0)))
}

async fn game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> ApiResult<ApiGameView> {
    let store = state.games.store();
    let game = store.game(game_id).await.map_err(reject)?;
    let participants = store.participant_count(game_id).await;
    Ok(Json(ApiGameView::from_game(game, participants)))
}

async fn delete_game_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(action): Json<ApiUserAction>,
) -> ApiResult<ApiGameView> {
    let game = state
        .games
        .delete_game(game_id, action.user_id)
        .await
        .map_err(reject)?;
    Ok(Json(ApiGameView::from_game(game, 0)))
}

async fn submit_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(request): Json<ApiSubmitRequest>,
) -> ApiResult<GameSubmission> {
    state
        .games
        .submit_guess(game_id, request.user_id, request.guessed_value, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn close_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(action): Json<ApiUserAction>,
) -> ApiResult<CloseOutcome> {
    let game = state.games.store().game(game_id).await.map_err(reject)?;
    if game.creator_id != action.user_id {
        return Err(reject(EngineError::Validation(
            "only the creator can close a game".to_string(),
        )));
    }
    state
        .games
        .close_game(game_id, Utc::now(), CloseTrigger::Manual)
        .await
        .map(Json)
        .map_err(reject)
}

async fn reveal_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> ApiResult<ApiRevealResponse> {
    let values = state.games.revealed_values(game_id).await.map_err(reject)?;
    let game = state.games.store().game(game_id).await.map_err(reject)?;
    Ok(Json(ApiRevealResponse {
        game_id,
        values,
        salt: game.salt,
        hash_commit: game.hash_commit,
    }))
}

async fn verify_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(request): Json<ApiVerifyRequest>,
) -> ApiResult<ApiVerifyResponse> {
    let valid = state
        .games
        .verify_game(game_id, &request.values)
        .await
        .map_err(reject)?;
    Ok(Json(ApiVerifyResponse { game_id, valid }))
}

async fn claim_handler(
    State(state): State<AppState>,
    Path(winner_id): Path<u64>,
    Json(action): Json<ApiUserAction>,
) -> ApiResult<WinnerRecord> {
    state
        .games
        .claim_reward(winner_id, action.user_id, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn deliver_handler(
    State(state): State<AppState>,
    Path(winner_id): Path<u64>,
    Json(action): Json<ApiUserAction>,
) -> ApiResult<WinnerRecord> {
    state
        .games
        .mark_delivered(winner_id, action.user_id, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

async fn message_handler(
    State(state): State<AppState>,
    Path(winner_id): Path<u64>,
    Json(request): Json<ApiMessageRequest>,
) -> ApiResult<RewardMessage> {
    state
        .games
        .post_message(winner_id, request.user_id, request.message, Utc::now())
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_engine::config::EngineConfig;
    use reel_engine::game::{FairnessKey, GameFairnessEngine, GameStore};
    use reel_engine::notify::LogNotifier;
    use reel_engine::random::ScriptedRandom;
    use reel_engine::store::SocialStore;
    use reel_engine::{build_scorers, GameConfig};

    fn app_state() -> AppState {
        let engagement = EngagementService::new(
            Arc::new(SocialStore::in_memory()),
            build_scorers(&EngineConfig::default()),
        )
        .with_random(ScriptedRandom::floor());
        let games = GameLifecycleManager::new(
            Arc::new(GameStore::in_memory()),
            GameFairnessEngine::new(FairnessKey::from_bytes([7u8; 32])),
            Arc::new(LogNotifier),
            GameConfig::default(),
        );
        AppState {
            engagement: Arc::new(engagement),
            games: Arc::new(games),
        }
    }

    fn registration(user_id: UserId, username: &str) -> Json<ApiRegisterRequest> {
        Json(ApiRegisterRequest {
            user_id,
            username: username.to_string(),
            tags: Some(vec![" Cats ".to_string(), String::new()]),
        })
    }

    fn acting(user_id: UserId) -> Json<ApiUserAction> {
        Json(ApiUserAction { user_id })
    }

    #[tokio::test]
    async fn users_register_and_follow() {
        let state = app_state();
        let Json(profile) = register_handler(State(state.clone()), registration(1, "maya"))
            .await
            .unwrap();
        assert_eq!(profile.engaged_tags.len(), 1);
        assert!(profile.engaged_tags.contains("cats"));
        register_handler(State(state.clone()), registration(2, "lee"))
            .await
            .unwrap();

        let (status, _) = register_handler(State(state.clone()), registration(1, "again"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);

        let Json(follow) = follow_handler(
            State(state.clone()),
            Path(2),
            Json(ApiFollowRequest { creator_id: 1 }),
        )
        .await
        .unwrap();
        assert!(follow.created);
        assert_eq!(state.engagement.store().follower_count(1).await, 1);

        let (status, _) = follow_handler(
            State(state.clone()),
            Path(2),
            Json(ApiFollowRequest { creator_id: 2 }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn items_are_deleted_by_their_creator() {
        let state = app_state();
        for (user_id, name) in [(1, "maya"), (2, "lee")] {
            register_handler(State(state.clone()), registration(user_id, name))
                .await
                .unwrap();
        }
        publish_handler(
            State(state.clone()),
            Json(ApiPublishRequest {
                id: 10,
                creator_id: 1,
                caption: Some("reel".to_string()),
                tags: None,
            }),
        )
        .await
        .unwrap();

        let (status, _) = delete_item_handler(State(state.clone()), Path(10), acting(2))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let Json(item) = delete_item_handler(State(state.clone()), Path(10), acting(1))
            .await
            .unwrap();
        assert!(!item.is_active);
        assert_eq!(state.engagement.store().accrual(1).await.unwrap().total_reach, 0);

        let (status, _) = share_handler(State(state.clone()), Path(10), acting(2))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn games_are_deleted_by_their_creator() {
        let state = app_state();
        let Json(view) = create_game_handler(
            State(state.clone()),
            Json(ApiCreateGameRequest {
                creator_id: 1,
                title: "Guess the jar".to_string(),
                description: None,
                reward_type: "product".to_string(),
                number_of_winners: None,
                guess_min: None,
                guess_max: None,
                reel_id: None,
                duration_hours: None,
                auto_close: None,
            }),
        )
        .await
        .unwrap();

        let (status, _) = delete_game_handler(State(state.clone()), Path(view.id), acting(2))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        delete_game_handler(State(state.clone()), Path(view.id), acting(1))
            .await
            .unwrap();
        assert!(!state.games.store().game(view.id).await.unwrap().is_active);
    }
}
