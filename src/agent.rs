//! 玩家代理
//!
//! 编排层在玩家持有优先权时调用 take_action：传入该玩家自己的观察历史、
//! 脱敏视图（看不到对手手牌与双方牌库）、可用行动，以及上一次被判非法时的反馈。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::JudgeError;
use crate::llm::{CompletionRequest, LlmClient};
use crate::oracle::prompts;
use crate::storage::AgentDescriptor;

/// 玩家观察历史中的一步
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStep {
    pub visible_information: String,
    pub available_actions: String,
    /// 该步玩家给出的行动；尚未行动时为 None
    #[serde(default)]
    pub action: Option<String>,
}

#[async_trait]
pub trait Agent: Send + Sync {
    async fn take_action(
        &self,
        history: &[HistoryStep],
        view: &str,
        available_actions: &str,
        feedback: Option<&str>,
    ) -> Result<String, JudgeError>;

    fn describe(&self) -> AgentDescriptor;
}

/// 取回复中最后一行 "ACTION:" 之后的内容；没有该前缀时取整段回复
pub fn parse_action(reply: &str) -> String {
    reply
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ACTION:"))
        .unwrap_or(reply)
        .trim()
        .to_string()
}

/// 直接把局面交给 LLM 的朴素玩家
pub struct LlmAgent {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
}

impl LlmAgent {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, temperature: Option<f32>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    async fn take_action(
        &self,
        history: &[HistoryStep],
        view: &str,
        available_actions: &str,
        feedback: Option<&str>,
    ) -> Result<String, JudgeError> {
        let messages = prompts::player_messages(history, view, available_actions, feedback);
        let request =
            CompletionRequest::new(self.model.clone(), messages).with_temperature(self.temperature);
        let reply = self
            .client
            .complete(&request)
            .await
            .map_err(|e| JudgeError::Agent(e.to_string()))?;
        Ok(parse_action(&reply))
    }

    fn describe(&self) -> AgentDescriptor {
        AgentDescriptor {
            kind: "llm".to_string(),
            model: Some(self.model.clone()),
        }
    }
}

/// 预置行动的玩家（测试用）；行动用完后一直 "Pass"
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    actions: Mutex<VecDeque<String>>,
    feedback_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedAgent {
    pub fn new(actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            actions: Mutex::new(actions.into_iter().map(Into::into).collect()),
            feedback_seen: Mutex::new(Vec::new()),
        }
    }

    /// 每次被调用时收到的反馈
    pub fn feedback_seen(&self) -> Vec<Option<String>> {
        self.feedback_seen
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    pub fn turns_taken(&self) -> usize {
        self.feedback_seen.lock().map(|f| f.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn take_action(
        &self,
        _history: &[HistoryStep],
        _view: &str,
        _available_actions: &str,
        feedback: Option<&str>,
    ) -> Result<String, JudgeError> {
        if let Ok(mut seen) = self.feedback_seen.lock() {
            seen.push(feedback.map(str::to_string));
        }
        let next = self
            .actions
            .lock()
            .ok()
            .and_then(|mut actions| actions.pop_front());
        Ok(next.unwrap_or_else(|| "Pass".to_string()))
    }

    fn describe(&self) -> AgentDescriptor {
        AgentDescriptor {
            kind: "scripted".to_string(),
            model: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_parse_action_prefix() {
        let reply = "I have two lands.\nACTION: Play Island\n";
        assert_eq!(parse_action(reply), "Play Island");
    }

    #[test]
    fn test_parse_action_without_prefix() {
        assert_eq!(parse_action("  Pass \n"), "Pass");
    }

    #[tokio::test]
    async fn test_llm_agent_uses_player_model() {
        let client = Arc::new(ScriptedLlmClient::always("thinking\nACTION: Attack with Grizzly Bears"));
        let agent = LlmAgent::new(client.clone(), "o3-mini", None);
        let action = agent
            .take_action(&[], "view", "Attack", Some("not enough mana"))
            .await
            .unwrap();
        assert_eq!(action, "Attack with Grizzly Bears");
        assert_eq!(client.requests()[0].model, "o3-mini");
        assert_eq!(agent.describe().model.as_deref(), Some("o3-mini"));
    }

    #[tokio::test]
    async fn test_scripted_agent_passes_when_exhausted() {
        let agent = ScriptedAgent::new(["Play Island"]);
        assert_eq!(agent.take_action(&[], "", "", None).await.unwrap(), "Play Island");
        assert_eq!(agent.take_action(&[], "", "", Some("x")).await.unwrap(), "Pass");
        assert_eq!(agent.feedback_seen(), vec![None, Some("x".to_string())]);
    }
}
