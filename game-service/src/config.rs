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

use anyhow::Context;
use chrono::TimeDelta;
use serde::Deserialize;
use wikirace_common::{DEFAULT_CODE_LENGTH, DEFAULT_EXPIRATION_HOURS, expand_env_vars};

use crate::engine::{DEFAULT_MAX_CODE_ATTEMPTS, DEFAULT_MAX_WRITE_ATTEMPTS, EngineSettings};

pub const CONFIG_PATH_ENV: &str = "WIKIRACE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub logger: LoggerConfig,
    pub game: GameConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// "dev", "staging" or "prod".
    pub env: String,
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub expiration_hours: i64,
    pub code_length: usize,
    pub max_code_attempts: u32,
    pub max_write_attempts: u32,
    pub sweep_interval_seconds: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            expiration_hours: DEFAULT_EXPIRATION_HOURS,
            code_length: DEFAULT_CODE_LENGTH,
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            sweep_interval_seconds: 60,
        }
    }
}

impl GameConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            expiration: TimeDelta::hours(self.expiration_hours.max(1)),
            max_code_attempts: self.max_code_attempts.max(1),
            max_write_attempts: self.max_write_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Dynamodb,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub table_name: String,
    pub endpoint: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            table_name: "wikirace_games".to_string(),
            endpoint: None,
        }
    }
}

impl ServiceConfig {
    /// Loads the config from `--config <path>` or `WIKIRACE_CONFIG_PATH`.
    /// With neither set, every default applies.
    pub fn load(args: &[String]) -> anyhow::Result<Self> {
        match config_path(args) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        Self::from_yaml(&raw).with_context(|| format!("failed to parse config file {path}"))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let expanded = expand_env_vars(raw);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    pub fn default_log_filter(&self) -> String {
        format!("game_service={},tower_http=info", self.logger.level.trim())
    }
}

fn config_path(args: &[String]) -> Option<String> {
    let from_args = args
        .windows(2)
        .find(|pair| pair[0] == "--config")
        .map(|pair| pair[1].clone());

    from_args
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
