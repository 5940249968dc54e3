//! 请求缓存：按请求指纹（内容寻址）保存回复，相同请求直接返回旧回复
//!
//! 指纹 = sha256(规范化 JSON{model, messages, temperature, schema})。条目一经写入不再修改、不失效；
//! 磁盘条目通过「临时文件 + rename」原子落盘，多个会话并发写同一指纹时内容相同，不会产生不一致。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::llm::{CompletionRequest, LlmClient, LlmError};

/// 计算请求指纹：消息内容去除首尾空白后按规范化 JSON（键有序）哈希
pub fn fingerprint(request: &CompletionRequest) -> String {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role, "content": m.content.trim() }))
        .collect();
    let canonical = serde_json::json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
        "schema": request.schema,
    });
    hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
}

/// 持久化的缓存条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub reply: String,
    pub created_at: DateTime<Utc>,
}

/// 内存 + 可选目录的两级缓存
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, String>>,
    dir: Option<PathBuf>,
}

impl ResponseCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 使用目录持久化（每个指纹一个 `<fingerprint>.json`）
    pub fn with_dir(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            dir: Some(dir.as_ref().to_path_buf()),
        })
    }

    fn entry_path(&self, fingerprint: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(format!("{fingerprint}.json")))
    }

    pub async fn get(&self, fingerprint: &str) -> Option<String> {
        if let Some(reply) = self.entries.read().await.get(fingerprint) {
            return Some(reply.clone());
        }
        let path = self.entry_path(fingerprint)?;
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        self.entries
            .write()
            .await
            .insert(entry.fingerprint.clone(), entry.reply.clone());
        Some(entry.reply)
    }

    /// 写入条目；已存在的指纹保持不变
    pub async fn put(&self, fingerprint: &str, reply: &str) -> std::io::Result<()> {
        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(fingerprint) {
                return Ok(());
            }
            entries.insert(fingerprint.to_string(), reply.to_string());
        }
        let Some(path) = self.entry_path(fingerprint) else {
            return Ok(());
        };
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            reply: reply.to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&entry)?;
        let temp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &path).await?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// 带缓存的客户端包装：命中时不调用下层（也不消耗重试预算）
pub struct CachingLlmClient {
    inner: Arc<dyn LlmClient>,
    cache: Arc<ResponseCache>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, cache: Arc<ResponseCache>) -> Self {
        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl LlmClient for CachingLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let key = fingerprint(request);
        if let Some(reply) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache hit {}", &key[..12]);
            return Ok(reply);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let reply = self.inner.complete(request).await?;
        if let Err(e) = self.cache.put(&key, &reply).await {
            tracing::warn!("Failed to persist cache entry {}: {}", key, e);
        }
        Ok(reply)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
