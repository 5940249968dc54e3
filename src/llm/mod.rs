//! LLM 层：客户端抽象、OpenAI 兼容实现、重试与缓存包装、脚本化 Mock

pub mod cache;
pub mod message;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use cache::{fingerprint, CacheEntry, CachingLlmClient, ResponseCache};
pub use message::{Message, Role};
pub use mock::ScriptedLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{CompletionRequest, LlmClient, LlmError};
