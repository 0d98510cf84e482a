//! Durable key-value collaborators for the leader pointer.

use async_trait::async_trait;
use cadence_common::{CadenceError, LeaderRecord};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::path::PathBuf;
use tokio::sync::Mutex;

use cadence_common::constants::redis_keys::LEADER_PREFIX;

/// Where a [`super::LeaderDirectory`] keeps its pointer
#[async_trait]
pub trait PointerStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet; `Err` when the record is unreadable or corrupt
    async fn load(&self) -> Result<Option<LeaderRecord>, CadenceError>;

    async fn save(&self, record: &LeaderRecord) -> Result<(), CadenceError>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// JSON file store (`{"leader": "..."}`)
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PointerStore for FileStore {
    async fn load(&self) -> Result<Option<LeaderRecord>, CadenceError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CadenceError::Persistence(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        serde_json::from_str(&data).map(Some).map_err(|e| {
            CadenceError::Persistence(format!("corrupt pointer in {}: {e}", self.path.display()))
        })
    }

    async fn save(&self, record: &LeaderRecord) -> Result<(), CadenceError> {
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| CadenceError::Persistence(e.to_string()))?;

        // Write-then-rename so a crash never leaves a half-written pointer
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| {
                CadenceError::Persistence(format!("failed to write {}: {e}", tmp.display()))
            })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            CadenceError::Persistence(format!("failed to replace {}: {e}", self.path.display()))
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Redis-backed store, one key per node: `cadence:leader:{node_id}`
pub struct RedisStore {
    redis: ConnectionManager,
    key: String,
}

impl RedisStore {
    /// Connect with a connection manager (handles reconnection)
    pub async fn connect(redis_url: &str, node_id: &str) -> Result<Self, CadenceError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CadenceError::Persistence(format!("invalid Redis URL: {e}")))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| CadenceError::Persistence(format!("failed to connect to Redis: {e}")))?;

        Ok(Self {
            redis,
            key: format!("{LEADER_PREFIX}{node_id}"),
        })
    }
}

#[async_trait]
impl PointerStore for RedisStore {
    async fn load(&self) -> Result<Option<LeaderRecord>, CadenceError> {
        let mut conn = self.redis.clone();
        let data: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(|e| CadenceError::Persistence(e.to_string()))?;

        match data {
            Some(d) => serde_json::from_str(&d)
                .map(Some)
                .map_err(|e| {
                    CadenceError::Persistence(format!("corrupt pointer at {}: {e}", self.key))
                }),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &LeaderRecord) -> Result<(), CadenceError> {
        let data =
            serde_json::to_string(record).map_err(|e| CadenceError::Persistence(e.to_string()))?;
        let mut conn = self.redis.clone();
        conn.set::<_, _, ()>(&self.key, data)
            .await
            .map_err(|e| CadenceError::Persistence(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("redis:{}", self.key)
    }
}

/// In-process store for tests and ephemeral clients
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<LeaderRecord>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leader(leader: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(LeaderRecord { leader: leader.into() })),
            fail_writes: false,
        }
    }

    /// A store whose writes always fail
    pub fn read_only() -> Self {
        Self {
            record: Mutex::new(None),
            fail_writes: true,
        }
    }

    pub async fn stored(&self) -> Option<String> {
        self.record.lock().await.as_ref().map(|r| r.leader.clone())
    }
}

#[async_trait]
impl PointerStore for MemoryStore {
    async fn load(&self) -> Result<Option<LeaderRecord>, CadenceError> {
        Ok(self.record.lock().await.clone())
    }

    async fn save(&self, record: &LeaderRecord) -> Result<(), CadenceError> {
        if self.fail_writes {
            return Err(CadenceError::Persistence("store is read-only".to_string()));
        }
        *self.record.lock().await = Some(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
