//! 重试策略：瞬时错误（限流 / 网络）按指数退避 + 随机抖动重试
//!
//! 第 n 次重试前休眠 `base_delay * 2^n + uniform(0..=max_jitter)`；最多重试 max_retries 次，
//! 之后把最后一次错误原样返回。非瞬时错误立即返回，不重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::config::RetrySection;
use crate::llm::{CompletionRequest, LlmClient, LlmError};

/// 退避参数
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    pub fn from_config(section: &RetrySection) -> Self {
        Self {
            max_retries: section.max_retries,
            base_delay: Duration::from_millis(section.base_delay_ms),
            max_jitter: Duration::from_millis(section.max_jitter_ms),
        }
    }

    /// 第 attempt 次重试的退避下限（不含抖动）
    pub fn backoff_floor(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        let delay = self.backoff_floor(attempt) + jitter;
        match err {
            LlmError::RateLimited {
                retry_after_ms: Some(ms),
            } => delay.max(Duration::from_millis(*ms)),
            _ => delay,
        }
    }
}

/// 带重试的客户端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(request).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(
                        "LLM call failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt + 1,
                        self.config.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, ScriptedLlmClient};
    use std::time::Instant;

    fn request() -> CompletionRequest {
        CompletionRequest::new("test-model", vec![Message::user("hi")])
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_jitter: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_always_rate_limited_attempts_ceiling_plus_one() {
        let inner = Arc::new(ScriptedLlmClient::failing(LlmError::RateLimited {
            retry_after_ms: None,
        }));
        let config = fast_config(3);
        let floors: Duration = (0..3).map(|n| config.backoff_floor(n)).sum();
        let client = RetryingLlmClient::new(inner.clone(), config);

        let start = Instant::now();
        let result = client.complete(&request()).await;

        assert!(matches!(result, Err(LlmError::RateLimited { .. })));
        assert_eq!(inner.calls(), 4);
        assert!(start.elapsed() >= floors);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let inner = Arc::new(ScriptedLlmClient::failing(LlmError::ApiError(
            "invalid api key".into(),
        )));
        let client = RetryingLlmClient::new(inner.clone(), fast_config(3));

        let result = client.complete(&request()).await;
        assert!(matches!(result, Err(LlmError::ApiError(_))));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let inner = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Network("connection reset".into())),
            Err(LlmError::RateLimited {
                retry_after_ms: Some(1),
            }),
            Ok("done".into()),
        ]));
        let client = RetryingLlmClient::new(inner.clone(), fast_config(3));

        assert_eq!(client.complete(&request()).await.unwrap(), "done");
        assert_eq!(inner.calls(), 3);
    }

    #[test]
    fn test_backoff_floor_doubles() {
        let config = fast_config(3);
        assert_eq!(config.backoff_floor(0), Duration::from_millis(5));
        assert_eq!(config.backoff_floor(3), Duration::from_millis(40));
    }
}
