//! 错误恢复引擎
//!
//! 根据 JudgeError 类型返回 RecoveryAction，供编排循环决定是重做当前阶段还是终止。
//! 可恢复的错误会计入会话错误预算，由熔断器兜底，不会无限循环。

use crate::core::{JudgeError, RecoveryAction};
use crate::llm::LlmError;

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &JudgeError) -> RecoveryAction {
        match err {
            JudgeError::ScriptExecution(_)
            | JudgeError::ConsensusFailed { .. }
            | JudgeError::MalformedReply(_) => RecoveryAction::RetryPhase,
            // 重试层已经退避过；再失败就让这一阶段重来，而不是终止整局
            JudgeError::Oracle(e) if e.is_transient() => RecoveryAction::RetryPhase,
            JudgeError::Oracle(LlmError::InvalidResponse(_)) => RecoveryAction::RetryPhase,
            JudgeError::Oracle(_) => RecoveryAction::Abort,
            JudgeError::Agent(_) => RecoveryAction::RetryPhase,
            JudgeError::Storage(_) | JudgeError::Config(_) => RecoveryAction::Abort,
        }
    }
}
