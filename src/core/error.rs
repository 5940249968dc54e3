//! 编排错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 JudgeError 决定重试当前阶段还是终止会话。
//! 非法行动不是错误，它以反馈形式回到玩家手里（见 orchestrator）。

use thiserror::Error;

use crate::llm::LlmError;
use crate::storage::StorageError;

/// 对局编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum JudgeError {
    /// 裁判调用失败（瞬时错误已在重试层耗尽，或非瞬时错误）
    #[error("oracle error: {0}")]
    Oracle(#[from] LlmError),

    /// 裁判回复无法解析为期望的结构
    #[error("malformed oracle reply: {0}")]
    MalformedReply(String),

    /// 单路脚本执行失败（已回滚）
    #[error("script execution failed: {0}")]
    ScriptExecution(String),

    /// 所有采样都未产生可执行结果，且批量重试已耗尽
    #[error("no consensus after {attempts} attempts: {last_error}")]
    ConsensusFailed { attempts: u32, last_error: String },

    #[error("agent error: {0}")]
    Agent(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {0}")]
    Config(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 记入错误日志与错误计数，下一轮重做当前阶段
    RetryPhase,
    /// 终止会话，错误向上传播
    Abort,
}
