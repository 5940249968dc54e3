//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；请求中的 model / temperature 逐次生效。
//! 错误映射：限流（429 / rate limit）→ RateLimited，传输层错误 → Network，其余 → ApiError。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{CompletionRequest, LlmClient, LlmError, Message, Role};

/// Token 使用统计（累计值）；由调用方持有并显式传递，多个客户端可共享同一个累加器
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }

    /// 按模型单价估算累计费用（美元）；未知模型返回 None
    pub fn estimated_cost_usd(&self, model: &str) -> Option<f64> {
        let (input, output) = price_per_token(model)?;
        let (prompt, completion, _) = self.get();
        Some(prompt as f64 * input + completion as f64 * output)
    }
}

/// (输入, 输出) 每 token 单价
fn price_per_token(model: &str) -> Option<(f64, f64)> {
    let per_million = match model {
        m if m.starts_with("claude-sonnet-4") => (3.0, 15.0),
        m if m.starts_with("claude-opus-4") => (15.0, 75.0),
        m if m.starts_with("gpt-4o-mini") => (0.15, 0.6),
        m if m.starts_with("gpt-4o") => (2.5, 10.0),
        m if m.starts_with("o3-mini") => (1.1, 4.4),
        _ => return None,
    };
    Some((per_million.0 / 1_000_000.0, per_million.1 / 1_000_000.0))
}

fn classify_error(e: OpenAIError) -> LlmError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
    {
        LlmError::RateLimited {
            retry_after_ms: None,
        }
    } else if matches!(e, OpenAIError::Reqwest(_)) {
        LlmError::Network(message)
    } else {
        LlmError::ApiError(message)
    }
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>, usage: TokenUsage) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            usage,
        }
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let invalid = |e: OpenAIError| LlmError::InvalidResponse(e.to_string());
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .messages(self.to_openai_messages(&request.messages)?);
        if let Some(t) = request.temperature {
            args.temperature(t);
        }
        let api_request = args
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .map_err(classify_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse("empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates_and_prices() {
        let usage = TokenUsage::new();
        usage.add(1_000_000, 0);
        usage.add(0, 1_000_000);
        assert_eq!(usage.get(), (1_000_000, 1_000_000, 2_000_000));
        let cost = usage.estimated_cost_usd("claude-sonnet-4-20250514").unwrap();
        assert!((cost - 18.0).abs() < 1e-9);
        assert!(usage.estimated_cost_usd("unknown-model").is_none());
    }

    #[test]
    fn test_shared_accumulator() {
        let usage = TokenUsage::new();
        let a = OpenAiClient::new(None, Some("sk-test"), usage.clone());
        let b = OpenAiClient::new(None, Some("sk-test"), usage.clone());
        a.usage.add(10, 5);
        b.usage.add(1, 1);
        assert_eq!(usage.get(), (11, 6, 17));
    }
}
