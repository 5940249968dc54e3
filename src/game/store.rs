//! 状态仓库：权威 GameState、有限长度的历史状态、行动日志与已执行脚本
//!
//! 单写者：同一局对局的编排循环串行推进，因此内部不加锁。
//! 唯一改写权威状态的入口是 commit。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::game::GameState;
use crate::sandbox::MutationScript;

/// 行动日志条目：只追加，不修改
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub participant: usize,
    pub action: String,
    pub seq: u64,
}

/// 权威状态与历史
#[derive(Clone, Debug)]
pub struct StateStore {
    current: GameState,
    past_states: VecDeque<GameState>,
    history_limit: usize,
    action_log: Vec<ActionRecord>,
    script_history: Vec<MutationScript>,
    error_messages: Vec<String>,
}

impl StateStore {
    pub fn new(initial: GameState, history_limit: usize) -> Self {
        Self {
            current: initial,
            past_states: VecDeque::new(),
            history_limit,
            action_log: Vec::new(),
            script_history: Vec::new(),
            error_messages: Vec::new(),
        }
    }

    /// 从检查点恢复的各部分重建
    pub fn from_parts(
        current: GameState,
        past_states: Vec<GameState>,
        history_limit: usize,
        action_log: Vec<ActionRecord>,
        script_history: Vec<MutationScript>,
        error_messages: Vec<String>,
    ) -> Self {
        let mut store = Self {
            current,
            past_states: past_states.into(),
            history_limit,
            action_log,
            script_history,
            error_messages,
        };
        store.trim_history();
        store
    }

    pub fn current(&self) -> &GameState {
        &self.current
    }

    /// 深拷贝当前状态
    pub fn snapshot(&self) -> GameState {
        self.current.clone()
    }

    /// 提交沙箱产出的候选状态：旧状态进入历史，候选原样成为权威状态
    pub fn commit(&mut self, candidate: GameState, script: MutationScript) {
        let previous = std::mem::replace(&mut self.current, candidate);
        self.past_states.push_back(previous);
        self.trim_history();
        if !script.is_empty() {
            self.script_history.push(script);
        }
    }

    /// 追加一条已接受的行动，返回其序号
    pub fn record_action(&mut self, participant: usize, action: impl Into<String>) -> u64 {
        let seq = self.action_log.len() as u64;
        self.action_log.push(ActionRecord {
            participant,
            action: action.into(),
            seq,
        });
        seq
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    pub fn action_log(&self) -> &[ActionRecord] {
        &self.action_log
    }

    pub fn accepted_actions(&self) -> usize {
        self.action_log.len()
    }

    pub fn script_history(&self) -> &[MutationScript] {
        &self.script_history
    }

    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    pub fn past_states(&self) -> Vec<GameState> {
        self.past_states.iter().cloned().collect()
    }

    fn trim_history(&mut self) {
        while self.past_states.len() > self.history_limit {
            self.past_states.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::MutationOp;

    fn state() -> GameState {
        GameState::with_libraries(vec![vec![], vec![]])
    }

    #[test]
    fn test_commit_replaces_state_verbatim() {
        let mut store = StateStore::new(state(), 4);
        let mut candidate = store.snapshot();
        candidate.player_boards[1].life = 17;

        store.commit(candidate.clone(), MutationScript::new(vec![MutationOp::Log {
            message: "bolt".into(),
        }]));

        assert_eq!(store.current(), &candidate);
        assert_eq!(store.past_states().len(), 1);
        assert_eq!(store.script_history().len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = StateStore::new(state(), 2);
        for turn in 2..6 {
            let mut next = store.snapshot();
            next.turn_number = turn;
            store.commit(next, MutationScript::default());
        }
        let past = store.past_states();
        assert_eq!(past.len(), 2);
        assert_eq!(past[0].turn_number, 3);
        assert_eq!(past[1].turn_number, 4);
        assert!(store.script_history().is_empty());
    }

    #[test]
    fn test_action_log_sequence_is_monotonic() {
        let mut store = StateStore::new(state(), 2);
        assert_eq!(store.record_action(0, "Play Forest"), 0);
        assert_eq!(store.record_action(1, "Pass"), 1);
        assert_eq!(store.action_log()[1].participant, 1);
        assert_eq!(store.accepted_actions(), 2);
    }
}
