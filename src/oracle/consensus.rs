//! 共识引擎
//!
//! 每个决策点向裁判并发发出 N 个相同请求（join_all，全部返回后再归约，不提前结束）。
//! 分类字段取多数，平票取序号最小的采样；脚本在沙箱中各自执行，
//! 成功的候选状态按内容哈希分组投票。全部脚本失败时把沙箱错误作为上下文整批重发。

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::core::JudgeError;
use crate::game::GameState;
use crate::oracle::{AdvanceReply, AnalysisReply, Oracle, OracleContext, ValidationReply};
use crate::sandbox::{ExecutionOutcome, MutationScript, Sandbox};

/// 取多数值，返回代表该值的最小采样序号与票数；空输入返回 None
pub fn majority<T: PartialEq>(values: &[T]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (index, value) in values.iter().enumerate() {
        // 只在某个值第一次出现时计票
        if values[..index].contains(value) {
            continue;
        }
        let count = values.iter().filter(|v| *v == value).count();
        match best {
            Some((_, top)) if top >= count => {}
            _ => best = Some((index, count)),
        }
    }
    best
}

/// 投票统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    /// 胜出值的票数
    pub votes: usize,
    /// 参与投票的采样数
    pub total: usize,
    /// 调用出错或脚本失败而被排除的采样数
    pub failed: usize,
}

/// 一次共识的结果
#[derive(Clone, Debug)]
pub struct ConsensusResult<R> {
    /// 代表胜出结果的那条回复（序号最小者）
    pub reply: R,
    /// 胜出的候选状态；不涉及脚本时为 None
    pub state: Option<GameState>,
    pub tally: Tally,
}

struct ScriptVote<R> {
    reply: R,
    state: GameState,
    tally: Tally,
}

pub struct ConsensusEngine {
    oracle: Arc<dyn Oracle>,
    sandbox: Sandbox,
    samples: usize,
    max_script_attempts: u32,
}

impl ConsensusEngine {
    pub fn new(oracle: Arc<dyn Oracle>, sandbox: Sandbox, samples: usize, max_script_attempts: u32) -> Self {
        Self {
            oracle,
            sandbox,
            samples: samples.max(1),
            max_script_attempts: max_script_attempts.max(1),
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// 校验玩家行动。多数判非法时 state 为 None，reply 取自序号最小的非法采样
    pub async fn validate(
        &self,
        base: &GameState,
        mut ctx: OracleContext,
        action: &str,
    ) -> Result<ConsensusResult<ValidationReply>, JudgeError> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_script_attempts {
            let results = join_all(
                (0..self.samples).map(|_| self.oracle.validate_and_apply(&ctx, action)),
            )
            .await;
            let (replies, errored) = split_results(results)?;

            let verdicts: Vec<bool> = replies.iter().map(|r| r.is_action_valid).collect();
            let Some((rep, votes)) = majority(&verdicts) else {
                continue;
            };
            let tally = Tally {
                votes,
                total: replies.len(),
                failed: errored,
            };

            if !verdicts[rep] {
                debug!(votes, total = tally.total, "action judged invalid");
                return Ok(ConsensusResult {
                    reply: replies[rep].clone(),
                    state: None,
                    tally,
                });
            }

            let valid: Vec<ValidationReply> =
                replies.into_iter().filter(|r| r.is_action_valid).collect();
            match self.vote_on_scripts(base, valid, |r| {
                r.mutation_script.clone().unwrap_or_default()
            }) {
                Ok(vote) => {
                    return Ok(ConsensusResult {
                        reply: vote.reply,
                        state: Some(vote.state),
                        tally: Tally {
                            failed: vote.tally.failed + errored,
                            ..vote.tally
                        },
                    })
                }
                Err(reports) => {
                    warn!(attempt, failed = reports.len(), "every validation script failed");
                    last_error = reports.first().cloned().unwrap_or_default();
                    ctx = ctx.with_error_feedback(reports);
                }
            }
        }
        Err(JudgeError::ConsensusFailed {
            attempts: self.max_script_attempts,
            last_error,
        })
    }

    /// 推进到下一个决策点；优先权玩家取自胜出的采样
    pub async fn advance(
        &self,
        base: &GameState,
        mut ctx: OracleContext,
    ) -> Result<ConsensusResult<AdvanceReply>, JudgeError> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_script_attempts {
            let results = join_all(
                (0..self.samples).map(|_| self.oracle.advance_to_next_decision_point(&ctx)),
            )
            .await;
            let (replies, errored) = split_results(results)?;

            match self.vote_on_scripts(base, replies, |r| r.mutation_script.clone()) {
                Ok(vote) => {
                    return Ok(ConsensusResult {
                        reply: vote.reply,
                        state: Some(vote.state),
                        tally: Tally {
                            failed: vote.tally.failed + errored,
                            ..vote.tally
                        },
                    })
                }
                Err(reports) => {
                    warn!(attempt, failed = reports.len(), "every advance script failed");
                    last_error = reports.first().cloned().unwrap_or_default();
                    ctx = ctx.with_error_feedback(reports);
                }
            }
        }
        Err(JudgeError::ConsensusFailed {
            attempts: self.max_script_attempts,
            last_error,
        })
    }

    /// 局面分析：对 (winner, priority_player) 取多数
    pub async fn analyze(
        &self,
        ctx: &OracleContext,
    ) -> Result<ConsensusResult<AnalysisReply>, JudgeError> {
        let results = join_all((0..self.samples).map(|_| self.oracle.analyze_position(ctx))).await;
        let (replies, errored) = split_results(results)?;

        let verdicts: Vec<_> = replies.iter().map(AnalysisReply::verdict).collect();
        let (rep, votes) = majority(&verdicts).ok_or_else(|| JudgeError::ConsensusFailed {
            attempts: 1,
            last_error: "no analysis replies".into(),
        })?;

        Ok(ConsensusResult {
            tally: Tally {
                votes,
                total: replies.len(),
                failed: errored,
            },
            reply: replies[rep].clone(),
            state: None,
        })
    }

    /// 在沙箱中执行每个采样的脚本，按结果状态的内容哈希投票；全部失败时返回错误报告
    fn vote_on_scripts<R: Clone>(
        &self,
        base: &GameState,
        replies: Vec<R>,
        script_of: impl Fn(&R) -> MutationScript,
    ) -> Result<ScriptVote<R>, Vec<String>> {
        let mut candidates: Vec<(R, GameState, String)> = Vec::new();
        let mut reports = Vec::new();

        for (index, reply) in replies.into_iter().enumerate() {
            let script = script_of(&reply);
            match self.sandbox.apply(base, &script) {
                ExecutionOutcome::Applied { state, .. } => {
                    let hash = state.content_hash();
                    candidates.push((reply, state, hash));
                }
                outcome => {
                    let report = outcome.error_report().unwrap_or_default();
                    debug!(sample = index, error = %report, "sample script failed");
                    reports.push(report);
                }
            }
        }

        let hashes: Vec<&str> = candidates.iter().map(|(_, _, h)| h.as_str()).collect();
        let Some((rep, votes)) = majority(&hashes) else {
            reports.dedup();
            return Err(reports);
        };

        let tally = Tally {
            votes,
            total: candidates.len(),
            failed: reports.len(),
        };
        let (reply, state, _) = candidates.swap_remove(rep);
        Ok(ScriptVote {
            reply,
            state,
            tally,
        })
    }
}

/// 拆出成功回复与出错数；全部出错时传播第一个错误
fn split_results<R>(results: Vec<Result<R, JudgeError>>) -> Result<(Vec<R>, usize), JudgeError> {
    let mut replies = Vec::new();
    let mut first_error = None;
    let mut errored = 0;
    for result in results {
        match result {
            Ok(reply) => replies.push(reply),
            Err(e) => {
                errored += 1;
                warn!(error = %e, "oracle sample failed");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) if replies.is_empty() => Err(e),
        _ => Ok((replies, errored)),
    }
}
