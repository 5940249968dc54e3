//! 裁判回复的结构化类型
//!
//! 三种调用各有一个回复类型；schemars 生成的 JSON Schema 会嵌入请求，
//! 要求裁判严格按此结构回复。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::sandbox::MutationScript;

/// 校验并执行玩家行动的回复
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReply {
    /// 对规则适用的推理过程
    #[serde(default)]
    pub reasoning: String,
    /// 行动是否合法
    pub is_action_valid: bool,
    /// 行动不合法时给玩家的解释
    #[serde(default)]
    pub invalid_action_feedback: Option<String>,
    /// 行动合法时执行它的变更脚本
    #[serde(default)]
    pub mutation_script: Option<MutationScript>,
    /// 若行动直接结束了对局，胜者座位号
    #[serde(default)]
    pub winner: Option<usize>,
}

/// 推进到下一个决策点的回复
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AdvanceReply {
    #[serde(default)]
    pub reasoning: String,
    /// 下一个需要做决定的玩家
    pub priority_player: usize,
    /// 自动发生的规则变化（抓牌、重置、阶段推进等），可以为空
    #[serde(default)]
    pub mutation_script: MutationScript,
}

/// 局面分析的回复
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisReply {
    #[serde(default)]
    pub reasoning: String,
    /// 当前持有优先权的玩家
    pub priority_player: usize,
    /// 只揭示给优先权玩家的信息（如检视牌库顶）
    #[serde(default)]
    pub revealed_information: String,
    /// 优先权玩家可用的法术力
    #[serde(default)]
    pub available_mana: String,
    /// 优先权玩家可执行的行动
    #[serde(default)]
    pub available_actions: String,
    /// 对局结束时的胜者；进行中为 null。该键必须出现
    pub winner: Option<usize>,
}

impl AnalysisReply {
    /// 参与共识的判定字段
    pub fn verdict(&self) -> (Option<usize>, usize) {
        (self.winner, self.priority_player)
    }
}

/// 生成某个回复类型的 JSON Schema
pub fn reply_schema<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
