//! 对局主控：GameMaster
//!
//! 串行推进状态机：等待行动 → 校验并执行 → 推进到下一决策点 → 局面分析 → 等待行动，
//! 直到分出胜负、触发熔断或被取消。每次分析之后写检查点；结束时把记录移到 finished。
//! 可恢复的失败记入错误日志并重做当前阶段，不可恢复的错误从 game_loop 传播出去。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::agent::{Agent, HistoryStep};
use crate::config::SessionSection;
use crate::core::state::{SessionLimits, SessionOutcome, SessionPhase};
use crate::core::{JudgeError, RecoveryAction, RecoveryEngine, SessionSupervisor};
use crate::game::{render_omniscient, render_player_view, GameState, StateStore};
use crate::oracle::{AnalysisReply, ConsensusEngine, OracleContext};
use crate::storage::{SessionRecord, SessionStore};

/// 展示给裁判的最近错误条数
const RECENT_ERRORS: usize = 5;

pub struct GameMaster {
    session_id: String,
    store: StateStore,
    consensus: ConsensusEngine,
    agents: Vec<Arc<dyn Agent>>,
    persistence: Arc<dyn SessionStore>,
    supervisor: SessionSupervisor,
    recovery: RecoveryEngine,
    limits: SessionLimits,
    phase: SessionPhase,
    priority_player: usize,
    pending_action: Option<String>,
    invalid_action_feedback: Option<String>,
    histories: Vec<Vec<HistoryStep>>,
    last_analysis: Option<AnalysisReply>,
    error_count: usize,
    step_count: usize,
    outcome: Option<SessionOutcome>,
    created_at: DateTime<Utc>,
}

impl GameMaster {
    /// 新对局。第一步没有玩家行动，直接进入推进阶段
    pub fn new(
        session_id: impl Into<String>,
        initial: GameState,
        consensus: ConsensusEngine,
        agents: Vec<Arc<dyn Agent>>,
        persistence: Arc<dyn SessionStore>,
        session: &SessionSection,
    ) -> Result<Self, JudgeError> {
        if agents.len() != initial.player_count() {
            return Err(JudgeError::Config(format!(
                "{} agents for {} players",
                agents.len(),
                initial.player_count()
            )));
        }
        let players = initial.player_count();
        let priority_player = initial.active_player;
        Ok(Self {
            session_id: session_id.into(),
            store: StateStore::new(initial, session.history_limit),
            consensus,
            agents,
            persistence,
            supervisor: SessionSupervisor::new(),
            recovery: RecoveryEngine::new(),
            limits: limits_from(session),
            phase: SessionPhase::ValidatingAndApplyingAction,
            priority_player,
            pending_action: None,
            invalid_action_feedback: None,
            histories: vec![Vec::new(); players],
            last_analysis: None,
            error_count: 0,
            step_count: 0,
            outcome: None,
            created_at: Utc::now(),
        })
    }

    /// 从进行中的检查点恢复
    pub fn resume(
        record: SessionRecord,
        consensus: ConsensusEngine,
        agents: Vec<Arc<dyn Agent>>,
        persistence: Arc<dyn SessionStore>,
        session: &SessionSection,
    ) -> Result<Self, JudgeError> {
        if agents.len() != record.game_state.player_count() {
            return Err(JudgeError::Config(format!(
                "{} agents for {} players",
                agents.len(),
                record.game_state.player_count()
            )));
        }
        // 检查点总在分析之后写入；没有分析结果说明第一步尚未完成
        let phase = if record.outcome.is_some() {
            SessionPhase::SessionComplete
        } else if record.last_analysis.is_some() {
            SessionPhase::AwaitingProposedAction
        } else {
            SessionPhase::ValidatingAndApplyingAction
        };
        let mut histories = record.player_observation_histories;
        histories.resize(agents.len(), Vec::new());
        info!(
            session = %record.session_id,
            steps = record.step_count,
            "Resuming session from checkpoint"
        );
        Ok(Self {
            session_id: record.session_id,
            store: StateStore::from_parts(
                record.game_state,
                record.past_game_states,
                session.history_limit,
                record.action_log,
                record.script_history,
                record.error_messages,
            ),
            consensus,
            agents,
            persistence,
            supervisor: SessionSupervisor::new(),
            recovery: RecoveryEngine::new(),
            limits: limits_from(session),
            phase,
            priority_player: record.priority_player,
            pending_action: None,
            invalid_action_feedback: record.invalid_action_feedback,
            histories,
            last_analysis: record.last_analysis,
            error_count: record.error_count,
            step_count: record.step_count,
            outcome: record.outcome,
            created_at: record.created_at,
        })
    }

    pub fn with_supervisor(mut self, supervisor: SessionSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &GameState {
        self.store.current()
    }

    pub fn state_store(&self) -> &StateStore {
        &self.store
    }

    pub fn priority_player(&self) -> usize {
        self.priority_player
    }

    pub fn invalid_action_feedback(&self) -> Option<&str> {
        self.invalid_action_feedback.as_deref()
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn histories(&self) -> &[Vec<HistoryStep>] {
        &self.histories
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    /// 运行到对局结束
    pub async fn game_loop(&mut self) -> Result<SessionOutcome, JudgeError> {
        info!(session = %self.session_id, "Session started");
        loop {
            if self.supervisor.is_cancelled() {
                info!(session = %self.session_id, "Session cancelled, discarding in-flight results");
                self.phase = SessionPhase::SessionComplete;
                self.outcome = Some(SessionOutcome::Cancelled);
                return Ok(SessionOutcome::Cancelled);
            }

            if self.phase == SessionPhase::SessionComplete {
                if let Some(outcome) = self.outcome {
                    return Ok(outcome);
                }
            }

            if let Some(reason) = self.limits.exceeded(
                self.store.current().turn_number,
                self.error_count,
                self.store.accepted_actions(),
            ) {
                warn!(session = %self.session_id, ?reason, "Session budget exhausted");
                let outcome = SessionOutcome::Timeout { reason };
                self.complete(outcome).await?;
                return Ok(outcome);
            }

            match self.run_phase().await {
                Ok(()) => {}
                Err(e) => match self.recovery.handle(&e) {
                    RecoveryAction::RetryPhase => {
                        if self.supervisor.is_cancelled() {
                            continue;
                        }
                        warn!(session = %self.session_id, phase = ?self.phase, error = %e, "Phase failed, retrying");
                        self.error_count += 1;
                        self.store.record_error(format!("{:?}: {}", self.phase, e));
                    }
                    RecoveryAction::Abort => return Err(e),
                },
            }
        }
    }

    async fn run_phase(&mut self) -> Result<(), JudgeError> {
        match self.phase {
            SessionPhase::AwaitingProposedAction => self.await_action().await,
            SessionPhase::ValidatingAndApplyingAction => self.validate_action().await,
            SessionPhase::AdvancingToNextDecisionPoint => self.advance().await,
            SessionPhase::AnalyzingCurrentPosition => self.analyze().await,
            SessionPhase::SessionComplete => {
                Err(JudgeError::Config("session completed without outcome".into()))
            }
        }
    }

    async fn await_action(&mut self) -> Result<(), JudgeError> {
        let player = self.priority_player;
        let agent = self
            .agents
            .get(player)
            .cloned()
            .ok_or_else(|| JudgeError::MalformedReply(format!("no agent for player {player}")))?;

        let (revealed, available_actions) = self
            .last_analysis
            .as_ref()
            .map(|a| (a.revealed_information.clone(), a.available_actions.clone()))
            .unwrap_or_default();
        let view = render_player_view(
            self.store.current(),
            player,
            self.consensus.sandbox().cards(),
            &revealed,
        );

        let action = agent
            .take_action(
                &self.histories[player],
                &view,
                &available_actions,
                self.invalid_action_feedback.as_deref(),
            )
            .await?;
        if self.supervisor.is_cancelled() {
            return Ok(());
        }

        let action = action.trim().to_string();
        debug!(session = %self.session_id, player, action = %action, "Player proposed action");
        self.histories[player].push(HistoryStep {
            visible_information: view,
            available_actions,
            action: Some(action.clone()),
        });
        self.invalid_action_feedback = None;
        self.pending_action = (!action.is_empty()).then_some(action);
        self.phase = SessionPhase::ValidatingAndApplyingAction;
        Ok(())
    }

    async fn validate_action(&mut self) -> Result<(), JudgeError> {
        let Some(action) = self.pending_action.clone() else {
            self.phase = SessionPhase::AdvancingToNextDecisionPoint;
            return Ok(());
        };

        let ctx = self.oracle_context();
        let result = self
            .consensus
            .validate(self.store.current(), ctx, &action)
            .await?;
        if self.supervisor.is_cancelled() {
            return Ok(());
        }

        let player = self.priority_player;
        self.pending_action = None;
        match result.state {
            None => {
                let feedback = result
                    .reply
                    .invalid_action_feedback
                    .unwrap_or_else(|| "The judge ruled this action illegal.".to_string());
                info!(session = %self.session_id, player, action = %action, feedback = %feedback, "Action rejected");
                self.error_count += 1;
                self.store
                    .record_error(format!("Invalid action by player {player} \"{action}\": {feedback}"));
                self.invalid_action_feedback = Some(feedback);
                self.phase = SessionPhase::AwaitingProposedAction;
            }
            Some(candidate) => {
                if let Some(w) = result.reply.winner {
                    // 胜负以局面分析为准
                    debug!(session = %self.session_id, winner = w, "Validation reports a winner");
                }
                let script = result.reply.mutation_script.unwrap_or_default();
                self.store.commit(candidate, script);
                let seq = self.store.record_action(player, action);
                debug!(
                    session = %self.session_id,
                    seq,
                    votes = result.tally.votes,
                    total = result.tally.total,
                    "Action accepted"
                );
                self.phase = SessionPhase::AdvancingToNextDecisionPoint;
            }
        }
        Ok(())
    }

    async fn advance(&mut self) -> Result<(), JudgeError> {
        let ctx = self.oracle_context();
        let result = self.consensus.advance(self.store.current(), ctx).await?;
        if self.supervisor.is_cancelled() {
            return Ok(());
        }

        let player = self.checked_player(result.reply.priority_player)?;
        let state = result
            .state
            .ok_or_else(|| JudgeError::ScriptExecution("advance produced no state".into()))?;
        self.store.commit(state, result.reply.mutation_script);
        self.priority_player = player;
        self.phase = SessionPhase::AnalyzingCurrentPosition;
        Ok(())
    }

    async fn analyze(&mut self) -> Result<(), JudgeError> {
        let ctx = self.oracle_context();
        let result = self.consensus.analyze(&ctx).await?;
        if self.supervisor.is_cancelled() {
            return Ok(());
        }

        let reply = result.reply;
        self.priority_player = self.checked_player(reply.priority_player)?;
        let winner = match reply.winner {
            Some(w) => Some(self.checked_player(w)?),
            None => None,
        };
        self.step_count += 1;
        self.last_analysis = Some(reply);
        info!(
            session = %self.session_id,
            step = self.step_count,
            turn = self.store.current().turn_number,
            priority = self.priority_player,
            "Step analysed"
        );

        match winner {
            Some(player) => self.complete(SessionOutcome::Winner { player }).await,
            None => {
                self.persistence.save(&self.to_record()).await?;
                debug!(session = %self.session_id, "Checkpoint saved");
                self.phase = SessionPhase::AwaitingProposedAction;
                Ok(())
            }
        }
    }

    /// 结束会话并把记录移到 finished
    async fn complete(&mut self, outcome: SessionOutcome) -> Result<(), JudgeError> {
        self.outcome = Some(outcome);
        self.phase = SessionPhase::SessionComplete;
        self.persistence.finish(&self.to_record()).await?;
        info!(session = %self.session_id, ?outcome, "Session complete");
        Ok(())
    }

    fn checked_player(&self, player: usize) -> Result<usize, JudgeError> {
        if player < self.store.current().player_count() {
            Ok(player)
        } else {
            Err(JudgeError::MalformedReply(format!("player {player} does not exist")))
        }
    }

    fn oracle_context(&self) -> OracleContext {
        let errors = self.store.error_messages();
        OracleContext {
            state_rendering: render_omniscient(
                self.store.current(),
                self.consensus.sandbox().cards(),
            ),
            priority_player: self.priority_player,
            action_log: self.store.action_log().to_vec(),
            script_history: self.store.script_history().to_vec(),
            recent_errors: errors[errors.len().saturating_sub(RECENT_ERRORS)..].to_vec(),
            error_feedback: Vec::new(),
        }
    }

    /// 当前会话的完整快照
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id.clone(),
            game_state: self.store.snapshot(),
            past_game_states: self.store.past_states(),
            player_observation_histories: self.histories.clone(),
            action_log: self.store.action_log().to_vec(),
            script_history: self.store.script_history().to_vec(),
            error_messages: self.store.error_messages().to_vec(),
            error_count: self.error_count,
            step_count: self.step_count,
            priority_player: self.priority_player,
            invalid_action_feedback: self.invalid_action_feedback.clone(),
            last_analysis: self.last_analysis.clone(),
            outcome: self.outcome,
            winner: self.outcome.and_then(|o| o.winner()),
            agents: self.agents.iter().map(|a| a.describe()).collect(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

fn limits_from(session: &SessionSection) -> SessionLimits {
    SessionLimits {
        max_turns: session.max_turns,
        max_errors: session.max_errors,
        max_actions: session.max_actions,
    }
}
