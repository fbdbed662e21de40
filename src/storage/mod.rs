//! Durable records of sent routes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::transactions::RouterTransactionDetails;
use crate::types::RouteInputParams;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(e: redis::RedisError) -> Self {
        StorageError::Redis(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Input of a sent route plus what was built and sent for each path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteData {
    pub input_params: RouteInputParams,
    pub paths_data: Vec<RouterTransactionDetails>,
    pub created_at: DateTime<Utc>,
}

impl RouteData {
    pub fn new(input_params: RouteInputParams, paths_data: Vec<RouterTransactionDetails>) -> Self {
        Self { input_params, paths_data, created_at: Utc::now() }
    }

    pub fn uuid(&self) -> &str {
        &self.input_params.uuid
    }
}

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn put(&self, data: &RouteData) -> Result<(), StorageError>;

    async fn get(&self, uuid: &str) -> Result<Option<RouteData>, StorageError>;
}

#[derive(Default)]
pub struct MemoryRouteStore {
    routes: DashMap<String, RouteData>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn put(&self, data: &RouteData) -> Result<(), StorageError> {
        self.routes.insert(data.uuid().to_string(), data.clone());
        Ok(())
    }

    async fn get(&self, uuid: &str) -> Result<Option<RouteData>, StorageError> {
        Ok(self.routes.get(uuid).map(|r| r.clone()))
    }
}

/// Routes as JSON under `route:<uuid>`
#[derive(Clone)]
pub struct RedisRouteStore {
    client: RedisClient,
}

impl RedisRouteStore {
    pub async fn new(redis_url: Option<&str>) -> Result<Self, StorageError> {
        let url = redis_url.unwrap_or("redis://127.0.0.1:6379");
        let client = RedisClient::open(url)?;
        // fail fast on a bad url or unreachable server
        client.get_multiplexed_async_connection().await?;
        info!("📦 Redis route store connected: {}", url);
        Ok(Self { client })
    }

    fn key(uuid: &str) -> String {
        format!("route:{}", uuid)
    }
}

#[async_trait]
impl RouteStore for RedisRouteStore {
    async fn put(&self, data: &RouteData) -> Result<(), StorageError> {
        let value = serde_json::to_string(data)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set::<_, _, ()>(Self::key(data.uuid()), value).await?;
        debug!("📦 stored route {}", data.uuid());
        Ok(())
    }

    async fn get(&self, uuid: &str) -> Result<Option<RouteData>, StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::key(uuid)).await?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }
}
