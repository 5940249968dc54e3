//! 基于 LlmClient 的裁判
//!
//! 每次调用把回复类型的 JSON Schema 放进消息与请求里，再从回复文本中提取 JSON 对象
//! （```json 代码块，或第一个 '{' 到最后一个 '}'）。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::core::JudgeError;
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::oracle::prompts;
use crate::oracle::schema::reply_schema;
use crate::oracle::{AdvanceReply, AnalysisReply, Oracle, OracleContext, ValidationReply};

/// 从回复文本中截取 JSON 对象
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}

/// 解析回复；required 中的键必须出现（值可以为 null）
pub fn parse_reply<T: DeserializeOwned>(output: &str, required: &[&str]) -> Result<T, JudgeError> {
    let json = extract_json(output)
        .ok_or_else(|| JudgeError::MalformedReply(format!("no JSON object in reply: {output}")))?;
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| JudgeError::MalformedReply(format!("{e}: {json}")))?;

    for key in required {
        if value.get(key).is_none() {
            return Err(JudgeError::MalformedReply(format!("missing field `{key}`")));
        }
    }

    serde_json::from_value(value).map_err(|e| JudgeError::MalformedReply(e.to_string()))
}

pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, temperature: Option<f32>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    async fn ask<T: DeserializeOwned + JsonSchema>(
        &self,
        build: impl FnOnce(&serde_json::Value) -> Vec<Message>,
        required: &[&str],
    ) -> Result<T, JudgeError> {
        let schema = reply_schema::<T>();
        let request = CompletionRequest::new(self.model.clone(), build(&schema))
            .with_temperature(self.temperature)
            .with_schema(schema);
        let output = self.client.complete(&request).await?;
        parse_reply(&output, required)
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn validate_and_apply(
        &self,
        ctx: &OracleContext,
        action: &str,
    ) -> Result<ValidationReply, JudgeError> {
        self.ask(|schema| prompts::validation_messages(ctx, action, schema), &["is_action_valid"])
            .await
    }

    async fn advance_to_next_decision_point(
        &self,
        ctx: &OracleContext,
    ) -> Result<AdvanceReply, JudgeError> {
        self.ask(|schema| prompts::advance_messages(ctx, schema), &["priority_player"])
            .await
    }

    async fn analyze_position(&self, ctx: &OracleContext) -> Result<AnalysisReply, JudgeError> {
        self.ask(
            |schema| prompts::analysis_messages(ctx, schema),
            &["priority_player", "winner"],
        )
        .await
    }
}
