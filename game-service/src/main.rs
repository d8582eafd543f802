// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod config;
mod engine;
mod store;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use lambda_http::run as lambda_run;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use wikirace_common::{
    AddPathRequest, ArticlesRequest, CreateGameRequest, Game, JoinGameRequest, LeaveGameRequest,
    normalize_game_code,
};

use crate::{
    config::{ServiceConfig, StoreBackend},
    engine::{GameEngine, GameError, RandomCodeGenerator},
    store::{DynamoGameStore, GameStore, InMemoryGameStore},
};

#[derive(Clone)]
struct AppState {
    engine: GameEngine,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = ServiceConfig::load(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.default_log_filter()),
        )
        .init();

    let store: Arc<dyn GameStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryGameStore::default()),
        StoreBackend::Dynamodb => {
            info!(
                table = %config.store.table_name,
                endpoint = ?config.store.endpoint,
                "using DynamoDB game store"
            );
            let endpoint = config
                .store
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|endpoint| !endpoint.is_empty());
            Arc::new(DynamoGameStore::connect(endpoint, &config.store.table_name).await)
        }
    };

    let state = AppState {
        engine: GameEngine::new(
            store,
            Arc::new(RandomCodeGenerator::new(config.game.code_length)),
            config.game.engine_settings(),
        ),
    };

    let app = build_router(state.clone());

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("AWS Lambda runtime detected; running game-service in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    let sweep_interval = Duration::from_secs(config.game.sweep_interval_seconds.max(1));
    let sweeper_engine = state.engine.clone();
    tokio::spawn(async move {
        run_expiry_sweeper(sweeper_engine, sweep_interval).await;
    });

    let bind_addr = parse_bind_addr("GAME_SERVICE_BIND", &config.server.bind)?;
    info!(%bind_addr, env = %config.server.env, "game-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_expiry_sweeper(engine: GameEngine, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match engine.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "purged expired games"),
            Err(error) => warn!(error = %error, "expired game sweep failed"),
        }
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ping", get(ping))
        .route("/api/v1/games", post(create_game_handler))
        .route("/api/v1/games/{code}", get(get_game_handler))
        .route("/api/v1/games/{code}/join", post(join_game_handler))
        .route("/api/v1/games/{code}/start", post(start_game_handler))
        .route("/api/v1/games/{code}/paths", post(add_path_handler))
        .route("/api/v1/games/{code}/reset", post(reset_game_handler))
        .route("/api/v1/games/{code}/articles", put(update_game_handler))
        .route("/api/v1/games/{code}/leave", post(leave_game_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "game-service"}))
}

async fn ping() -> Json<&'static str> {
    Json("pong")
}

async fn create_game_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateGameRequest>,
) -> Result<Json<Game>, ApiError> {
    require("leaderName", &request.leader_name)?;
    require("playerId", &request.player_id)?;

    let game = state
        .engine
        .create_game(request.leader_name.trim(), &request.player_id)
        .await?;
    Ok(Json(game))
}

async fn get_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Game>, ApiError> {
    let code = game_code(&code)?;
    Ok(Json(state.engine.get_game(&code).await?))
}

async fn join_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<JoinGameRequest>,
) -> Result<Json<Game>, ApiError> {
    let code = game_code(&code)?;
    require("playerId", &request.player_id)?;
    require("playerName", &request.player_name)?;

    let game = state
        .engine
        .join_game(&code, &request.player_id, request.player_name.trim())
        .await?;
    info!(code = %code, player_id = %request.player_id, "player joined game");
    Ok(Json(game))
}

async fn start_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<ArticlesRequest>,
) -> Result<Json<Game>, ApiError> {
    let code = game_code(&code)?;
    require("startArticle", &request.start_article)?;
    require("targetArticle", &request.target_article)?;

    let game = state
        .engine
        .start_game(&code, &request.start_article, &request.target_article)
        .await?;
    info!(
        code = %code,
        start_article = %game.start_article,
        target_article = %game.target_article,
        "game started"
    );
    Ok(Json(game))
}

async fn add_path_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<AddPathRequest>,
) -> Result<Json<Game>, ApiError> {
    let code = game_code(&code)?;
    require("playerId", &request.player_id)?;
    require("article", &request.article)?;

    Ok(Json(
        state
            .engine
            .add_path(&code, &request.player_id, &request.article)
            .await?,
    ))
}

async fn reset_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Game>, ApiError> {
    let code = game_code(&code)?;
    let game = state.engine.reset_game(&code).await?;
    info!(code = %code, "game reset");
    Ok(Json(game))
}

async fn update_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<ArticlesRequest>,
) -> Result<Json<Game>, ApiError> {
    let code = game_code(&code)?;
    Ok(Json(
        state
            .engine
            .update_game(&code, &request.start_article, &request.target_article)
            .await?,
    ))
}

async fn leave_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<LeaveGameRequest>,
) -> Result<Json<Game>, ApiError> {
    let code = game_code(&code)?;
    require("playerId", &request.player_id)?;

    let game = state.engine.leave_game(&code, &request.player_id).await?;
    info!(code = %code, player_id = %request.player_id, "player left game");
    Ok(Json(game))
}

fn game_code(raw: &str) -> Result<String, ApiError> {
    let code = normalize_game_code(raw);
    if code.is_empty() {
        return Err(ApiError::bad_request("gameCode is required"));
    }
    Ok(code)
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

/// Stable error codes shared with clients.
const CODE_INTERNAL: u32 = 10001;
const CODE_BAD_REQUEST: u32 = 10003;
const CODE_GAME_NOT_FOUND: u32 = 10009;
const CODE_PLAYER_NOT_FOUND: u32 = 10010;
const CODE_INVALID_STATE: u32 = 10011;

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: u32,
    message: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: CODE_BAD_REQUEST,
            message: format!("Bad request: {}.", detail.into()),
        }
    }

    fn classified(status: StatusCode, code: u32, message: &str) -> Self {
        Self {
            status,
            code,
            message: message.to_string(),
        }
    }
}

impl From<GameError> for ApiError {
    fn from(error: GameError) -> Self {
        warn!(error = %format!("{error:#}"), "game operation failed");
        match error {
            GameError::GameNotFound(_) => {
                Self::classified(StatusCode::NOT_FOUND, CODE_GAME_NOT_FOUND, "Game not found.")
            }
            GameError::PlayerNotFound(_) => Self::classified(
                StatusCode::NOT_FOUND,
                CODE_PLAYER_NOT_FOUND,
                "Player not found.",
            ),
            GameError::InvalidState { .. } => Self::classified(
                StatusCode::CONFLICT,
                CODE_INVALID_STATE,
                "Invalid game state.",
            ),
            GameError::Internal(_) => Self::classified(
                StatusCode::INTERNAL_SERVER_ERROR,
                CODE_INTERNAL,
                "Internal server error.",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, code = self.code, "request failed");
        (
            self.status,
            Json(serde_json::json!({"code": self.code, "error": self.message})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CodeGenerator, EngineSettings};
    use async_trait::async_trait;
    use axum::extract::{Path, State};
    use chrono::{DateTime, Utc};
    use wikirace_common::GameState;

    use crate::store::{InsertOutcome, ReplaceOutcome};

    struct FixedCodeGenerator(&'static str);

    impl CodeGenerator for FixedCodeGenerator {
        fn generate(&self) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl GameStore for BrokenStore {
        async fn find_by_code(&self, _code: &str) -> anyhow::Result<Option<Game>> {
            Err(anyhow::anyhow!("dynamodb: credentials expired for arn:aws:iam::1234"))
        }

        async fn insert(&self, _game: &Game) -> anyhow::Result<InsertOutcome> {
            Err(anyhow::anyhow!("dynamodb: credentials expired for arn:aws:iam::1234"))
        }

        async fn replace(
            &self,
            _game: &Game,
            _expected_version: u64,
        ) -> anyhow::Result<ReplaceOutcome> {
            Err(anyhow::anyhow!("dynamodb: credentials expired for arn:aws:iam::1234"))
        }

        async fn purge_expired(&self, _now: DateTime<Utc>) -> anyhow::Result<usize> {
            Ok(0)
        }
    }

    fn app_state() -> AppState {
        AppState {
            engine: GameEngine::new(
                Arc::new(InMemoryGameStore::default()),
                Arc::new(FixedCodeGenerator("RACE42")),
                EngineSettings::default(),
            ),
        }
    }

    async fn create(state: &AppState, leader: &str, player_id: &str) -> Game {
        create_game_handler(
            State(state.clone()),
            Json(CreateGameRequest {
                leader_name: leader.to_string(),
                player_id: player_id.to_string(),
            }),
        )
        .await
        .unwrap()
        .0
    }

    async fn join(state: &AppState, code: &str, player_id: &str, name: &str) -> Game {
        join_game_handler(
            State(state.clone()),
            Path(code.to_string()),
            Json(JoinGameRequest {
                player_id: player_id.to_string(),
                player_name: name.to_string(),
            }),
        )
        .await
        .unwrap()
        .0
    }

    fn articles(start: &str, target: &str) -> Json<ArticlesRequest> {
        Json(ArticlesRequest {
            start_article: start.to_string(),
            target_article: target.to_string(),
        })
    }

    fn path(player_id: &str, article: &str) -> Json<AddPathRequest> {
        Json(AddPathRequest {
            player_id: player_id.to_string(),
            article: article.to_string(),
        })
    }

    #[tokio::test]
    async fn full_race_through_handlers() {
        let state = app_state();
        let created = create(&state, "Alice", "p1").await;
        assert_eq!(created.code, "RACE42");
        assert_eq!(created.state, GameState::Waiting);

        let joined = join(&state, "race42", "p2", "Bob").await;
        assert_eq!(joined.players.len(), 2);

        let started = start_game_handler(
            State(state.clone()),
            Path("RACE42".to_string()),
            articles("Dog", "Cat"),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(started.state, GameState::Playing);

        let game = add_path_handler(
            State(state.clone()),
            Path("RACE42".to_string()),
            path("p2", "Fish"),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(game.state, GameState::Playing);

        let game = add_path_handler(
            State(state.clone()),
            Path("RACE42".to_string()),
            path("p2", "Cat"),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(game.state, GameState::Finished);
        assert!(game.player("p2").unwrap().is_winner);

        let fetched = get_game_handler(State(state.clone()), Path("RACE42".to_string()))
            .await
            .unwrap()
            .0;
        assert_eq!(fetched, game);

        let reset = reset_game_handler(State(state), Path("RACE42".to_string()))
            .await
            .unwrap()
            .0;
        assert_eq!(reset.state, GameState::Waiting);
        assert!(reset.players.iter().all(|p| p.paths.is_empty()));
    }

    #[tokio::test]
    async fn update_and_leave_through_handlers() {
        let state = app_state();
        create(&state, "Alice", "p1").await;
        join(&state, "RACE42", "p2", "Bob").await;

        let updated = update_game_handler(
            State(state.clone()),
            Path("RACE42".to_string()),
            articles("Rust", "Crab"),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(updated.start_article, "Rust");
        assert_eq!(updated.target_article, "Crab");
        assert_eq!(updated.state, GameState::Waiting);

        let left = leave_game_handler(
            State(state.clone()),
            Path("RACE42".to_string()),
            Json(LeaveGameRequest {
                player_id: "p2".to_string(),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(left.players.len(), 1);
        assert!(left.players[0].is_leader);
    }

    #[tokio::test]
    async fn unknown_game_maps_to_not_found() {
        let state = app_state();
        let err = get_game_handler(State(state), Path("NOPE00".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, CODE_GAME_NOT_FOUND);
        assert_eq!(err.message, "Game not found.");
    }

    #[tokio::test]
    async fn unknown_player_maps_to_player_not_found() {
        let state = app_state();
        create(&state, "Alice", "p1").await;
        start_game_handler(
            State(state.clone()),
            Path("RACE42".to_string()),
            articles("Dog", "Cat"),
        )
        .await
        .unwrap();

        let err = add_path_handler(
            State(state),
            Path("RACE42".to_string()),
            path("ghost", "Fish"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, CODE_PLAYER_NOT_FOUND);
    }

    #[tokio::test]
    async fn restarting_a_running_game_is_a_conflict() {
        let state = app_state();
        create(&state, "Alice", "p1").await;
        start_game_handler(
            State(state.clone()),
            Path("RACE42".to_string()),
            articles("Dog", "Cat"),
        )
        .await
        .unwrap();

        let err = start_game_handler(
            State(state),
            Path("RACE42".to_string()),
            articles("Fish", "Bird"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, CODE_INVALID_STATE);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_the_engine() {
        let state = app_state();
        let err = create_game_handler(
            State(state.clone()),
            Json(CreateGameRequest {
                leader_name: "   ".to_string(),
                player_id: "p1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, CODE_BAD_REQUEST);
        assert!(err.message.contains("leaderName"));

        let err = add_path_handler(State(state.clone()), Path(" ".to_string()), path("p1", "Dog"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("gameCode"));

        let err = get_game_handler(State(state), Path("RACE42".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn store_failure_is_internal_and_hides_cause() {
        let state = AppState {
            engine: GameEngine::new(
                Arc::new(BrokenStore),
                Arc::new(FixedCodeGenerator("RACE42")),
                EngineSettings::default(),
            ),
        };

        let err = create_game_handler(
            State(state),
            Json(CreateGameRequest {
                leader_name: "Alice".to_string(),
                player_id: "p1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, CODE_INTERNAL);
        assert_eq!(err.message, "Internal server error.");
        assert!(!err.message.contains("arn:aws"));
    }

    #[tokio::test]
    async fn api_error_response_carries_status_code_and_message() {
        let response = ApiError::from(GameError::InvalidState {
            action: "start",
            state: GameState::Playing,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], CODE_INVALID_STATE);
        assert_eq!(value["error"], "Invalid game state.");
    }

    #[test]
    fn parse_bind_addr_uses_default_when_unset() {
        let addr = parse_bind_addr("GAME_SERVICE_BIND_TEST_UNSET", "127.0.0.1:9090").unwrap();
        assert_eq!(addr, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
        assert!(parse_bind_addr("GAME_SERVICE_BIND_TEST_UNSET", "not-an-addr").is_err());
    }

    #[tokio::test]
    async fn ping_and_health_respond() {
        assert_eq!(ping().await.0, "pong");
        assert_eq!(health().await.0["ok"], true);
    }
}
