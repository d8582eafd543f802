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

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    Client as DynamoClient, operation::put_item::PutItemError, types::AttributeValue,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use wikirace_common::{Game, GameCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// The stored document moved past `expected_version`, or is gone.
    Conflict,
}

/// Document store for games, keyed by game code.
///
/// Expired documents behave as if they were absent. `replace` is a
/// conditional write: it only lands when the stored version still equals
/// the version the caller read.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Game>>;
    async fn insert(&self, game: &Game) -> anyhow::Result<InsertOutcome>;
    async fn replace(&self, game: &Game, expected_version: u64) -> anyhow::Result<ReplaceOutcome>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize>;
}

#[derive(Default)]
pub struct InMemoryGameStore {
    games: RwLock<HashMap<GameCode, Game>>,
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Game>> {
        let now = Utc::now();
        let games = self.games.read().await;
        Ok(games
            .get(code)
            .filter(|game| !game.is_expired(now))
            .cloned())
    }

    async fn insert(&self, game: &Game) -> anyhow::Result<InsertOutcome> {
        let now = Utc::now();
        let mut games = self.games.write().await;
        if let Some(existing) = games.get(&game.code)
            && !existing.is_expired(now)
        {
            return Ok(InsertOutcome::DuplicateCode);
        }
        games.insert(game.code.clone(), game.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn replace(&self, game: &Game, expected_version: u64) -> anyhow::Result<ReplaceOutcome> {
        let now = Utc::now();
        let mut games = self.games.write().await;
        match games.get_mut(&game.code) {
            Some(stored) if stored.version == expected_version && !stored.is_expired(now) => {
                *stored = game.clone();
                Ok(ReplaceOutcome::Replaced)
            }
            _ => Ok(ReplaceOutcome::Conflict),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut games = self.games.write().await;
        let before = games.len();
        games.retain(|_, game| !game.is_expired(now));
        Ok(before - games.len())
    }
}

/// Games table in DynamoDB. One item per game: `code` is the partition key,
/// `expires_after` (epoch seconds) is the table's TTL attribute and
/// `document` holds the JSON aggregate.
#[derive(Clone)]
pub struct DynamoGameStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoGameStore {
    pub async fn connect(endpoint: Option<&str>, table_name: impl Into<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        Self {
            client: DynamoClient::new(&config),
            table_name: table_name.into(),
        }
    }
}

fn game_to_item(game: &Game) -> anyhow::Result<HashMap<String, AttributeValue>> {
    let document = serde_json::to_string(game).context("failed to encode game document")?;

    let mut item = HashMap::new();
    item.insert("code".to_string(), AttributeValue::S(game.code.clone()));
    item.insert(
        "version".to_string(),
        AttributeValue::N(game.version.to_string()),
    );
    item.insert(
        "expires_after".to_string(),
        AttributeValue::N(game.expires_after.timestamp().to_string()),
    );
    item.insert("document".to_string(), AttributeValue::S(document));
    Ok(item)
}

fn item_to_game(item: &HashMap<String, AttributeValue>) -> anyhow::Result<Game> {
    let document = item
        .get("document")
        .and_then(|value| value.as_s().ok())
        .context("game item has no document attribute")?;
    serde_json::from_str(document).context("failed to decode stored game document")
}

#[async_trait]
impl GameStore for DynamoGameStore {
    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Game>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("code", AttributeValue::S(code.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context("failed to get item from games table")?;

        let Some(item) = output.item() else {
            return Ok(None);
        };
        let game = item_to_game(item)?;
        // TTL deletion is lazy, so expired items can still be returned.
        if game.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(game))
    }

    async fn insert(&self, game: &Game) -> anyhow::Result<InsertOutcome> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(game_to_item(game)?))
            .condition_expression("attribute_not_exists(#code) OR #expires <= :now")
            .expression_attribute_names("#code", "code")
            .expression_attribute_names("#expires", "expires_after")
            .expression_attribute_values(
                ":now",
                AttributeValue::N(Utc::now().timestamp().to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(PutItemError::is_conditional_check_failed_exception) =>
            {
                debug!(code = %game.code, "game code already taken in games table");
                Ok(InsertOutcome::DuplicateCode)
            }
            Err(error) => Err(error).context("failed to put item into games table"),
        }
    }

    async fn replace(&self, game: &Game, expected_version: u64) -> anyhow::Result<ReplaceOutcome> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(game_to_item(game)?))
            .condition_expression("#version = :expected")
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(
                ":expected",
                AttributeValue::N(expected_version.to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(ReplaceOutcome::Replaced),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(PutItemError::is_conditional_check_failed_exception) =>
            {
                Ok(ReplaceOutcome::Conflict)
            }
            Err(error) => Err(error).context("failed to replace item in games table"),
        }
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> anyhow::Result<usize> {
        Ok(0)
    }
}
