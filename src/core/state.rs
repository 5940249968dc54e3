//! 会话状态机的阶段与结局

use serde::{Deserialize, Serialize};

/// 编排阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// 等待持有优先权的玩家提交行动
    AwaitingProposedAction,
    /// 裁判校验行动并给出变更脚本
    ValidatingAndApplyingAction,
    /// 执行自动的规则变化，推进到下一个决策点
    AdvancingToNextDecisionPoint,
    /// 总结局面、判定胜负
    AnalyzingCurrentPosition,
    SessionComplete,
}

/// 熔断原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutReason {
    TurnLimit,
    ErrorLimit,
    ActionLimit,
}

/// 会话结局
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    Winner { player: usize },
    Timeout { reason: TimeoutReason },
    Cancelled,
}

impl SessionOutcome {
    pub fn winner(&self) -> Option<usize> {
        match self {
            SessionOutcome::Winner { player } => Some(*player),
            _ => None,
        }
    }
}

/// 会话级预算
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_turns: u32,
    pub max_errors: usize,
    pub max_actions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_turns: 30,
            max_errors: 50,
            max_actions: 500,
        }
    }
}

impl SessionLimits {
    /// 检查是否超出任一预算
    pub fn exceeded(&self, turn_number: u32, errors: usize, actions: usize) -> Option<TimeoutReason> {
        if turn_number > self.max_turns {
            Some(TimeoutReason::TurnLimit)
        } else if errors > self.max_errors {
            Some(TimeoutReason::ErrorLimit)
        } else if actions > self.max_actions {
            Some(TimeoutReason::ActionLimit)
        } else {
            None
        }
    }
}
