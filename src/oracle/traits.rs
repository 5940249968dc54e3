//! 裁判抽象
//!
//! 编排层只通过 Oracle 与裁判交互；LlmOracle 基于 LlmClient 实现，ScriptedOracle 用于测试。

use async_trait::async_trait;

use crate::core::JudgeError;
use crate::game::ActionRecord;
use crate::oracle::{AdvanceReply, AnalysisReply, ValidationReply};
use crate::sandbox::MutationScript;

/// 一次裁判调用的上下文
#[derive(Clone, Debug, Default)]
pub struct OracleContext {
    /// 全知视角的局面渲染
    pub state_rendering: String,
    /// 当前持有优先权的玩家
    pub priority_player: usize,
    /// 已接受的行动
    pub action_log: Vec<ActionRecord>,
    /// 已执行的脚本（作为先例）
    pub script_history: Vec<MutationScript>,
    /// 会话错误日志的尾部
    pub recent_errors: Vec<String>,
    /// 本步骤中前几次脚本执行失败的报告，用于要求裁判修正
    pub error_feedback: Vec<String>,
}

impl OracleContext {
    pub fn with_error_feedback(mut self, reports: impl IntoIterator<Item = String>) -> Self {
        self.error_feedback.extend(reports);
        self
    }
}

/// 裁判
#[async_trait]
pub trait Oracle: Send + Sync {
    /// 校验玩家行动；合法时给出执行它的脚本
    async fn validate_and_apply(
        &self,
        ctx: &OracleContext,
        action: &str,
    ) -> Result<ValidationReply, JudgeError>;

    /// 执行自动的规则变化，推进到下一个需要玩家决定的时点
    async fn advance_to_next_decision_point(
        &self,
        ctx: &OracleContext,
    ) -> Result<AdvanceReply, JudgeError>;

    /// 总结局面：优先权、揭示信息、可用行动与胜负
    async fn analyze_position(&self, ctx: &OracleContext) -> Result<AnalysisReply, JudgeError>;
}
