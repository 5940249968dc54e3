//! 状态变更脚本：裁判提出的一串原子操作
//!
//! 固定词汇表代替任意代码执行；所有字段都通过 schemars 生成 JSON Schema 放入裁判请求中。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::game::TurnStep;

/// 非战场区域
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Library,
    Hand,
    Graveyard,
    Exile,
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Zone::Library => "library",
            Zone::Hand => "hand",
            Zone::Graveyard => "graveyard",
            Zone::Exile => "exile",
        };
        f.write_str(name)
    }
}

/// 放入牌库时的位置
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LibraryPosition {
    #[default]
    Top,
    Bottom,
}

/// 伤害 / 指示物的对象：玩家或永久物
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Player { player: usize },
    Permanent { id: u32 },
}

/// 单个原子操作
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationOp {
    #[schemars(description = "Player draws `count` cards from the top of their library.")]
    Draw { player: usize, count: u32 },

    #[schemars(
        description = "Move one card by name between non-battlefield zones. `to_player` defaults to `player`; `position` applies when the destination is a library."
    )]
    MoveCard {
        player: usize,
        card: String,
        from: Zone,
        to: Zone,
        #[serde(default)]
        to_player: Option<usize>,
        #[serde(default)]
        position: LibraryPosition,
    },

    #[schemars(
        description = "Put a card owned by `player` onto the battlefield. With `from` it is taken from that zone; without `from` it is created as a token. Assigns a new battlefield id."
    )]
    PutOntoBattlefield {
        player: usize,
        card: String,
        #[serde(default)]
        from: Option<Zone>,
        #[serde(default)]
        tapped: bool,
        #[serde(default)]
        controller: Option<usize>,
    },

    #[schemars(
        description = "Remove a permanent from the battlefield into its owner's zone. Its id is retired and anything attached to it becomes unattached. Tokens cease to exist."
    )]
    LeaveBattlefield { id: u32, to: Zone },

    #[schemars(description = "Tap a permanent.")]
    Tap { id: u32 },

    #[schemars(description = "Untap a permanent.")]
    Untap { id: u32 },

    #[schemars(description = "Untap every permanent controlled by `player`.")]
    UntapAll { player: usize },

    #[schemars(
        description = "Deal damage: a player loses that much life, a permanent gets marked damage."
    )]
    DealDamage { target: Target, amount: u32 },

    #[schemars(description = "Add `delta` (may be negative) to a player's life total.")]
    AdjustLife { player: usize, delta: i64 },

    #[schemars(
        description = "Add `delta` (may be negative) named counters to a player or permanent. Counts may not go below zero."
    )]
    AdjustCounter {
        target: Target,
        counter: String,
        delta: i64,
    },

    #[schemars(description = "Attach a permanent to another permanent, or detach it with `to: null`.")]
    Attach { id: u32, to: Option<u32> },

    #[schemars(description = "Record a continuous effect text on a permanent.")]
    AddEffect { id: u32, effect: String },

    #[schemars(description = "Remove all recorded effect texts from a permanent.")]
    ClearEffects { id: u32 },

    #[schemars(description = "Remove marked damage from every permanent.")]
    ClearDamage,

    #[schemars(description = "Push a spell or ability description onto the stack.")]
    PushStack { description: String },

    #[schemars(description = "Remove the top object of the stack after it resolves.")]
    PopStack,

    #[schemars(description = "Move to the given step of the current turn.")]
    SetStep { step: TurnStep },

    #[schemars(
        description = "Begin the next turn: turn number +1, the next player becomes active, step becomes UNTAP."
    )]
    NextTurn,

    #[schemars(description = "Print the top `count` cards of a player's library into the output.")]
    Look { player: usize, count: u32 },

    #[schemars(description = "Print the full definition of a card into the output.")]
    Inspect { card: String },

    #[schemars(description = "Print a diagnostic message into the output.")]
    Log { message: String },
}

impl MutationOp {
    /// 操作名（审计日志与错误信息使用）
    pub fn name(&self) -> &'static str {
        match self {
            MutationOp::Draw { .. } => "draw",
            MutationOp::MoveCard { .. } => "move_card",
            MutationOp::PutOntoBattlefield { .. } => "put_onto_battlefield",
            MutationOp::LeaveBattlefield { .. } => "leave_battlefield",
            MutationOp::Tap { .. } => "tap",
            MutationOp::Untap { .. } => "untap",
            MutationOp::UntapAll { .. } => "untap_all",
            MutationOp::DealDamage { .. } => "deal_damage",
            MutationOp::AdjustLife { .. } => "adjust_life",
            MutationOp::AdjustCounter { .. } => "adjust_counter",
            MutationOp::Attach { .. } => "attach",
            MutationOp::AddEffect { .. } => "add_effect",
            MutationOp::ClearEffects { .. } => "clear_effects",
            MutationOp::ClearDamage => "clear_damage",
            MutationOp::PushStack { .. } => "push_stack",
            MutationOp::PopStack => "pop_stack",
            MutationOp::SetStep { .. } => "set_step",
            MutationOp::NextTurn => "next_turn",
            MutationOp::Look { .. } => "look",
            MutationOp::Inspect { .. } => "inspect",
            MutationOp::Log { .. } => "log",
        }
    }
}

/// 操作序列
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MutationScript {
    pub ops: Vec<MutationOp>,
}

impl MutationScript {
    pub fn new(ops: Vec<MutationOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[MutationOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// 紧凑 JSON，用于裁判上下文中的「已执行脚本」
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oracle_script() {
        let raw = r#"[
            {"op": "draw", "player": 0, "count": 1},
            {"op": "deal_damage", "target": {"kind": "player", "player": 1}, "amount": 3},
            {"op": "put_onto_battlefield", "player": 0, "card": "Forest", "from": "hand"},
            {"op": "next_turn"}
        ]"#;
        let script: MutationScript = serde_json::from_str(raw).unwrap();
        assert_eq!(script.len(), 4);
        assert_eq!(script.ops()[0], MutationOp::Draw { player: 0, count: 1 });
        assert!(matches!(
            script.ops()[2],
            MutationOp::PutOntoBattlefield { from: Some(Zone::Hand), tapped: false, .. }
        ));
        assert_eq!(script.ops()[3].name(), "next_turn");
    }

    #[test]
    fn test_schema_lists_ops() {
        let schema = serde_json::to_string(&schemars::schema_for!(MutationScript)).unwrap();
        assert!(schema.contains("put_onto_battlefield"));
        assert!(schema.contains("adjust_counter"));
    }
}
