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

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXPIRATION_HOURS: i64 = 4;
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Characters a game code is drawn from.
pub const GAME_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub type PlayerId = String;
pub type GameCode = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Waiting,
    Playing,
    Finished,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GameState::Waiting => "waiting",
            GameState::Playing => "playing",
            GameState::Finished => "finished",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_leader: bool,
    #[serde(default)]
    pub is_winner: bool,
    /// Article names visited during the current session, in order.
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, is_leader: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_leader,
            is_winner: false,
            paths: Vec::new(),
        }
    }
}

/// A race and everyone in it. Stored and replaced as a single document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub code: GameCode,
    /// Join order. The first entry is the player who created the game.
    pub players: Vec<Player>,
    pub state: GameState,
    #[serde(default)]
    pub start_article: String,
    #[serde(default)]
    pub target_article: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub expires_after: DateTime<Utc>,
    /// Bumped on every persisted mutation; stores reject replaces made
    /// against an older value.
    #[serde(default)]
    pub version: u64,
}

impl Game {
    pub fn new(
        code: impl Into<GameCode>,
        leader_id: impl Into<PlayerId>,
        leader_name: impl Into<String>,
        expires_after: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.into(),
            players: vec![Player::new(leader_id, leader_name, true)],
            state: GameState::Waiting,
            start_article: String::new(),
            target_article: String::new(),
            start_time: None,
            end_time: None,
            expires_after,
            version: 0,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == player_id)
    }

    pub fn leader(&self) -> Option<&Player> {
        self.players.iter().find(|player| player.is_leader)
    }

    pub fn winner(&self) -> Option<&Player> {
        self.players.iter().find(|player| player.is_winner)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_after <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub leader_name: String,
    #[serde(alias = "playerID")]
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameRequest {
    #[serde(alias = "playerID")]
    pub player_id: PlayerId,
    pub player_name: String,
}

/// Body for both starting a game and changing its articles beforehand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlesRequest {
    pub start_article: String,
    pub target_article: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPathRequest {
    #[serde(alias = "playerID")]
    pub player_id: PlayerId,
    #[serde(alias = "path")]
    pub article: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveGameRequest {
    #[serde(alias = "playerID")]
    pub player_id: PlayerId,
}

/// Draw a random game code of `length` characters from [`GAME_CODE_ALPHABET`].
pub fn generate_game_code(length: usize) -> GameCode {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let index = rng.random_range(0..GAME_CODE_ALPHABET.len());
            GAME_CODE_ALPHABET[index] as char
        })
        .collect()
}

/// Canonical form of a code typed by a player.
pub fn normalize_game_code(input: &str) -> GameCode {
    input.trim().to_ascii_uppercase()
}

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}
