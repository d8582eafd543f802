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

//! Game lifecycle: create, join, start, record paths, reset, update, leave.
//!
//! Every mutation is a read-modify-write of the whole game document. Writes
//! are conditional on the version that was read; when another request got
//! there first the transition is re-applied to the fresh document, so
//! concurrent path submissions from racing players are never lost.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};
use wikirace_common::{
    DEFAULT_CODE_LENGTH, DEFAULT_EXPIRATION_HOURS, Game, GameState, Player, generate_game_code,
};

use crate::store::{GameStore, InsertOutcome, ReplaceOutcome};

pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 5;
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("game not found, code: {0}")]
    GameNotFound(String),

    #[error("player not found, id: {0}")]
    PlayerNotFound(String),

    #[error("cannot {action} while game is {state}")]
    InvalidState {
        action: &'static str,
        state: GameState,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> anyhow::Result<String> {
        Ok(generate_game_code(self.length))
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub expiration: TimeDelta,
    pub max_code_attempts: u32,
    pub max_write_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            expiration: TimeDelta::hours(DEFAULT_EXPIRATION_HOURS),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }
}

/// Whether a transition changed the document and needs to be written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Changed,
    Unchanged,
}

#[derive(Clone)]
pub struct GameEngine {
    store: Arc<dyn GameStore>,
    codes: Arc<dyn CodeGenerator>,
    settings: EngineSettings,
}

impl GameEngine {
    pub fn new(
        store: Arc<dyn GameStore>,
        codes: Arc<dyn CodeGenerator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            codes,
            settings,
        }
    }

    pub async fn create_game(&self, leader_name: &str, player_id: &str) -> Result<Game, GameError> {
        let attempts = self.settings.max_code_attempts.max(1);
        for attempt in 1..=attempts {
            let code = self.codes.generate()?;
            let game = Game::new(
                code,
                player_id,
                leader_name,
                Utc::now() + self.settings.expiration,
            );

            match self.store.insert(&game).await? {
                InsertOutcome::Inserted => {
                    info!(code = %game.code, player_id = %player_id, "game created");
                    return Ok(game);
                }
                InsertOutcome::DuplicateCode => {
                    warn!(code = %game.code, attempt, "generated game code already in use");
                }
            }
        }

        Err(GameError::Internal(anyhow::anyhow!(
            "no free game code after {attempts} attempts"
        )))
    }

    pub async fn join_game(
        &self,
        code: &str,
        player_id: &str,
        player_name: &str,
    ) -> Result<Game, GameError> {
        self.mutate(code, |game, _now| {
            apply_join(game, player_id, player_name);
            Ok(Transition::Changed)
        })
        .await
    }

    pub async fn get_game(&self, code: &str) -> Result<Game, GameError> {
        self.load(code).await
    }

    pub async fn start_game(
        &self,
        code: &str,
        start_article: &str,
        target_article: &str,
    ) -> Result<Game, GameError> {
        self.mutate(code, |game, now| {
            apply_start(game, start_article, target_article, now)?;
            Ok(Transition::Changed)
        })
        .await
    }

    pub async fn add_path(
        &self,
        code: &str,
        player_id: &str,
        article: &str,
    ) -> Result<Game, GameError> {
        self.mutate(code, |game, now| apply_path(game, player_id, article, now))
            .await
    }

    pub async fn reset_game(&self, code: &str) -> Result<Game, GameError> {
        self.mutate(code, |game, _now| {
            apply_reset(game);
            Ok(Transition::Changed)
        })
        .await
    }

    pub async fn update_game(
        &self,
        code: &str,
        start_article: &str,
        target_article: &str,
    ) -> Result<Game, GameError> {
        self.mutate(code, |game, _now| {
            game.start_article = start_article.to_string();
            game.target_article = target_article.to_string();
            Ok(Transition::Changed)
        })
        .await
    }

    pub async fn leave_game(&self, code: &str, player_id: &str) -> Result<Game, GameError> {
        self.mutate(code, |game, _now| {
            apply_leave(game, player_id)?;
            Ok(Transition::Changed)
        })
        .await
    }

    pub async fn purge_expired(&self) -> anyhow::Result<usize> {
        self.store.purge_expired(Utc::now()).await
    }

    async fn load(&self, code: &str) -> Result<Game, GameError> {
        match self.store.find_by_code(code).await? {
            Some(game) => Ok(game),
            None => {
                debug!(code = %code, "game not found");
                Err(GameError::GameNotFound(code.to_string()))
            }
        }
    }

    async fn mutate<F>(&self, code: &str, mut transition: F) -> Result<Game, GameError>
    where
        F: FnMut(&mut Game, DateTime<Utc>) -> Result<Transition, GameError> + Send,
    {
        let attempts = self.settings.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            let mut game = self.load(code).await?;
            let read_version = game.version;
            let now = Utc::now();

            if transition(&mut game, now)? == Transition::Unchanged {
                return Ok(game);
            }

            game.expires_after = now + self.settings.expiration;
            game.version = read_version + 1;

            match self.store.replace(&game, read_version).await? {
                ReplaceOutcome::Replaced => return Ok(game),
                ReplaceOutcome::Conflict => {
                    debug!(
                        code = %code,
                        attempt,
                        read_version,
                        "concurrent write detected, retrying"
                    );
                }
            }
        }

        Err(GameError::Internal(anyhow::anyhow!(
            "game {code} still contended after {attempts} write attempts"
        )))
    }
}

fn apply_join(game: &mut Game, player_id: &str, player_name: &str) {
    game.players.push(Player::new(player_id, player_name, false));
}

fn apply_start(
    game: &mut Game,
    start_article: &str,
    target_article: &str,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    if game.state != GameState::Waiting {
        return Err(GameError::InvalidState {
            action: "start",
            state: game.state,
        });
    }

    game.state = GameState::Playing;
    game.start_article = start_article.to_string();
    game.target_article = target_article.to_string();
    game.start_time = Some(now);
    game.end_time = None;
    Ok(())
}

fn apply_path(
    game: &mut Game,
    player_id: &str,
    article: &str,
    now: DateTime<Utc>,
) -> Result<Transition, GameError> {
    if game.state == GameState::Finished {
        return Ok(Transition::Unchanged);
    }

    let reached_target = article == game.target_article;
    let player = game
        .player_mut(player_id)
        .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
    player.paths.push(article.to_string());

    if reached_target {
        player.is_winner = true;
        game.state = GameState::Finished;
        game.end_time = Some(now);
        info!(code = %game.code, player_id = %player_id, "player reached the target article");
    }
    Ok(Transition::Changed)
}

fn apply_reset(game: &mut Game) {
    game.state = GameState::Waiting;
    game.start_article.clear();
    game.target_article.clear();
    game.start_time = None;
    game.end_time = None;
    for player in &mut game.players {
        player.paths.clear();
        player.is_winner = false;
    }
}

fn apply_leave(game: &mut Game, player_id: &str) -> Result<(), GameError> {
    let index = game
        .players
        .iter()
        .position(|player| player.id == player_id)
        .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
    game.players.remove(index);
    Ok(())
}
