//! 对局持久化
//!
//! 进行中的对局存于 `<data_dir>/ongoing_games/<id>.json`，结束后移到
//! `<data_dir>/finished_games/<id>.json`。写入先落临时文件再原子 rename，
//! 读者不会看到写了一半的记录。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::storage::SessionRecord;

const ONGOING_DIR: &str = "ongoing_games";
const FINISHED_DIR: &str = "finished_games";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(String),

    #[error("session not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Json(e.to_string())
    }
}

/// 会话存储；多个会话可并发读写
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 写入（覆盖）进行中的检查点
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError>;

    /// 写入最终记录并把会话从进行中移到已结束
    async fn finish(&self, record: &SessionRecord) -> Result<(), StorageError>;

    async fn load_ongoing(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError>;

    async fn load_finished(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError>;

    async fn list_ongoing(&self) -> Result<Vec<String>, StorageError>;

    async fn list_finished(&self) -> Result<Vec<String>, StorageError>;
}

/// 基于目录的存储
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    ongoing: PathBuf,
    finished: PathBuf,
}

impl FileSessionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        let ongoing = data_dir.join(ONGOING_DIR);
        let finished = data_dir.join(FINISHED_DIR);
        std::fs::create_dir_all(&ongoing)?;
        std::fs::create_dir_all(&finished)?;
        Ok(Self { ongoing, finished })
    }

    fn path_in(dir: &Path, session_id: &str) -> PathBuf {
        dir.join(format!("{session_id}.json"))
    }

    async fn write_atomic(path: &Path, record: &SessionRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(record)?;
        let temp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, path).await?;
        Ok(())
    }

    async fn read(path: &Path) -> Result<Option<SessionRecord>, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(dir: &Path) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let path = Self::path_in(&self.ongoing, &record.session_id);
        Self::write_atomic(&path, record).await?;
        tracing::debug!("Saved checkpoint: {}", path.display());
        Ok(())
    }

    async fn finish(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let path = Self::path_in(&self.finished, &record.session_id);
        Self::write_atomic(&path, record).await?;

        let ongoing = Self::path_in(&self.ongoing, &record.session_id);
        match tokio::fs::remove_file(&ongoing).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("Session {} moved to {}", record.session_id, path.display());
        Ok(())
    }

    async fn load_ongoing(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Self::read(&Self::path_in(&self.ongoing, session_id)).await
    }

    async fn load_finished(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Self::read(&Self::path_in(&self.finished, session_id)).await
    }

    async fn list_ongoing(&self) -> Result<Vec<String>, StorageError> {
        Self::list(&self.ongoing).await
    }

    async fn list_finished(&self) -> Result<Vec<String>, StorageError> {
        Self::list(&self.finished).await
    }
}

/// 内存存储（测试与一次性运行）
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    ongoing: RwLock<HashMap<String, SessionRecord>>,
    finished: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_keys(map: &HashMap<String, SessionRecord>) -> Vec<String> {
    let mut ids: Vec<String> = map.keys().cloned().collect();
    ids.sort();
    ids
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.ongoing
            .write()
            .await
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn finish(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.finished
            .write()
            .await
            .insert(record.session_id.clone(), record.clone());
        self.ongoing.write().await.remove(&record.session_id);
        Ok(())
    }

    async fn load_ongoing(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.ongoing.read().await.get(session_id).cloned())
    }

    async fn load_finished(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.finished.read().await.get(session_id).cloned())
    }

    async fn list_ongoing(&self) -> Result<Vec<String>, StorageError> {
        Ok(sorted_keys(&*self.ongoing.read().await))
    }

    async fn list_finished(&self) -> Result<Vec<String>, StorageError> {
        Ok(sorted_keys(&*self.finished.read().await))
    }
}
