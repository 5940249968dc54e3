//! 脚本化裁判（用于测试，无需 LLM）
//!
//! 每种调用各有一个回复队列，按调用顺序取出，耗尽后重复最后一条。
//! 队列为空时返回 MalformedReply。记录收到的上下文，便于断言错误反馈。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::JudgeError;
use crate::llm::LlmError;
use crate::oracle::{AdvanceReply, AnalysisReply, Oracle, OracleContext, ValidationReply};

type Scripted<T> = Vec<Result<T, LlmError>>;

#[derive(Debug)]
struct Queue<T> {
    replies: Scripted<T>,
    calls: AtomicUsize,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            replies: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> Queue<T> {
    fn next(&self, kind: &str) -> Result<T, JudgeError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(index).or_else(|| self.replies.last()) {
            Some(Ok(reply)) => Ok(reply.clone()),
            Some(Err(e)) => Err(JudgeError::Oracle(e.clone())),
            None => Err(JudgeError::MalformedReply(format!("no scripted {kind} reply"))),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct ScriptedOracle {
    validations: Queue<ValidationReply>,
    advances: Queue<AdvanceReply>,
    analyses: Queue<AnalysisReply>,
    contexts: Mutex<Vec<OracleContext>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validations(mut self, replies: Scripted<ValidationReply>) -> Self {
        self.validations.replies = replies;
        self
    }

    pub fn with_advances(mut self, replies: Scripted<AdvanceReply>) -> Self {
        self.advances.replies = replies;
        self
    }

    pub fn with_analyses(mut self, replies: Scripted<AnalysisReply>) -> Self {
        self.analyses.replies = replies;
        self
    }

    /// (validate, advance, analyze) 各自的调用次数
    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.validations.calls(),
            self.advances.calls(),
            self.analyses.calls(),
        )
    }

    pub fn contexts(&self) -> Vec<OracleContext> {
        self.contexts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn record(&self, ctx: &OracleContext) {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(ctx.clone());
        }
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn validate_and_apply(
        &self,
        ctx: &OracleContext,
        _action: &str,
    ) -> Result<ValidationReply, JudgeError> {
        self.record(ctx);
        self.validations.next("validation")
    }

    async fn advance_to_next_decision_point(
        &self,
        ctx: &OracleContext,
    ) -> Result<AdvanceReply, JudgeError> {
        self.record(ctx);
        self.advances.next("advance")
    }

    async fn analyze_position(&self, ctx: &OracleContext) -> Result<AnalysisReply, JudgeError> {
        self.record(ctx);
        self.analyses.next("analysis")
    }
}
