//! 沙箱执行器
//!
//! 持有只读卡牌定义表；apply(base, script) 先深拷贝 base，再逐条解释操作并校验不变量。
//! 任何错误都丢弃副本并返回 Failed（附诊断输出），base 永远不被修改；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Instant;

use crate::game::{CardDatabase, GameState};
use crate::sandbox::interpreter::apply_op;
use crate::sandbox::{MutationScript, SandboxError};

/// 一次脚本执行的结果
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// 成功：候选状态（尚未提交）与诊断输出
    Applied { state: GameState, output: String },
    /// 失败：错误与失败前已产生的输出
    Failed { error: SandboxError, output: String },
}

impl ExecutionOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionOutcome::Applied { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            ExecutionOutcome::Applied { output, .. } | ExecutionOutcome::Failed { output, .. } => {
                output
            }
        }
    }

    /// 取出候选状态；失败时为 None
    pub fn into_state(self) -> Option<GameState> {
        match self {
            ExecutionOutcome::Applied { state, .. } => Some(state),
            ExecutionOutcome::Failed { .. } => None,
        }
    }

    /// 反馈给裁判的错误描述（错误 + 输出）
    pub fn error_report(&self) -> Option<String> {
        match self {
            ExecutionOutcome::Applied { .. } => None,
            ExecutionOutcome::Failed { error, output } if output.is_empty() => {
                Some(error.to_string())
            }
            ExecutionOutcome::Failed { error, output } => {
                Some(format!("{error}\nOutput before failure:\n{output}"))
            }
        }
    }
}

/// 沙箱：脚本只能看到副本
#[derive(Clone, Debug)]
pub struct Sandbox {
    cards: Arc<CardDatabase>,
}

impl Sandbox {
    pub fn new(cards: Arc<CardDatabase>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &CardDatabase {
        &self.cards
    }

    pub fn apply(&self, base: &GameState, script: &MutationScript) -> ExecutionOutcome {
        let start = Instant::now();
        let mut working = base.clone();
        let mut lines = Vec::new();

        let result = script
            .ops()
            .iter()
            .enumerate()
            .try_for_each(|(index, op)| {
                apply_op(&mut working, op, &self.cards, &mut lines).map_err(|e| {
                    SandboxError::AtOp {
                        index,
                        op: op.name(),
                        source: Box::new(e),
                    }
                })
            })
            .and_then(|_| working.check_invariants());

        let audit = serde_json::json!({
            "event": "script_audit",
            "ops": script.len(),
            "ok": result.is_ok(),
            "duration_us": start.elapsed().as_micros() as u64,
            "error": result.as_ref().err().map(|e| e.to_string()),
        });
        tracing::debug!(audit = %audit.to_string(), "sandbox");

        let output = lines.join("\n");
        match result {
            Ok(()) => ExecutionOutcome::Applied {
                state: working,
                output,
            },
            Err(error) => ExecutionOutcome::Failed { error, output },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{MutationOp, Target, Zone};

    fn base() -> GameState {
        let mut s = GameState::with_libraries(vec![vec!["Island".into()], vec![]]);
        s.player_boards[0].hand = vec!["Forest".into()];
        s
    }

    fn sandbox() -> Sandbox {
        Sandbox::new(Arc::new(CardDatabase::new()))
    }

    #[test]
    fn test_success_leaves_base_untouched() {
        let base = base();
        let before = base.clone();
        let script = MutationScript::new(vec![
            MutationOp::PutOntoBattlefield {
                player: 0,
                card: "Forest".into(),
                from: Some(Zone::Hand),
                tapped: false,
                controller: None,
            },
            MutationOp::DealDamage {
                target: Target::Player { player: 1 },
                amount: 2,
            },
        ]);

        let outcome = sandbox().apply(&base, &script);
        assert!(outcome.is_ok());
        assert_eq!(base, before);
        let state = outcome.into_state().unwrap();
        assert_eq!(state.player_boards[1].life, 18);
        assert_eq!(state.next_battlefield_id, 1);
    }

    #[test]
    fn test_failure_discards_partial_mutation() {
        let base = base();
        let before = base.clone();
        let script = MutationScript::new(vec![
            MutationOp::Log {
                message: "checking".into(),
            },
            MutationOp::AdjustLife { player: 0, delta: -5 },
            MutationOp::Tap { id: 99 },
        ]);

        let outcome = sandbox().apply(&base, &script);
        assert!(!outcome.is_ok());
        assert_eq!(base, before);
        assert_eq!(outcome.output(), "checking");
        let report = outcome.error_report().unwrap();
        assert!(report.contains("op #2 (tap)"));
        assert!(report.contains("99"));
    }

    #[test]
    fn test_overflowing_script_fails_cleanly() {
        let base = base();
        let before = base.clone();
        let script = MutationScript::new(vec![
            MutationOp::AdjustLife { player: 0, delta: -20 },
            MutationOp::AdjustLife {
                player: 0,
                delta: i64::MAX,
            },
            MutationOp::AdjustLife {
                player: 0,
                delta: i64::MAX,
            },
        ]);

        let outcome = sandbox().apply(&base, &script);
        assert!(!outcome.is_ok());
        assert_eq!(base, before);
        let report = outcome.error_report().unwrap();
        assert!(report.contains("op #2 (adjust_life)"));
        assert!(report.contains("overflow"));
    }
}
