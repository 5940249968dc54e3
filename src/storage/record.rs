//! 对局检查点记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::HistoryStep;
use crate::core::SessionOutcome;
use crate::game::{ActionRecord, GameState};
use crate::oracle::AnalysisReply;
use crate::sandbox::MutationScript;

/// 参与者描述（用于按模型统计胜率）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// 一局对局的完整快照；进行中写入 ongoing_games，结束后移到 finished_games
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub game_state: GameState,
    /// 最近若干个历史状态（有上限）
    #[serde(default)]
    pub past_game_states: Vec<GameState>,
    /// 每名玩家的观察历史
    #[serde(default)]
    pub player_observation_histories: Vec<Vec<HistoryStep>>,
    #[serde(default)]
    pub action_log: Vec<ActionRecord>,
    #[serde(default)]
    pub script_history: Vec<MutationScript>,
    #[serde(default)]
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub error_count: usize,
    /// 已完成分析的步数
    #[serde(default)]
    pub step_count: usize,
    pub priority_player: usize,
    #[serde(default)]
    pub invalid_action_feedback: Option<String>,
    /// 最近一次局面分析，恢复时据此向玩家要行动
    #[serde(default)]
    pub last_analysis: Option<AnalysisReply>,
    #[serde(default)]
    pub outcome: Option<SessionOutcome>,
    #[serde(default)]
    pub winner: Option<usize>,
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn accepted_actions(&self) -> usize {
        self.action_log.len()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}
