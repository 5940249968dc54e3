//! 核心编排层：错误与恢复、会话阶段、会话监管、对局主控循环

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use error::{JudgeError, RecoveryAction};
pub use orchestrator::GameMaster;
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{SessionLimits, SessionOutcome, SessionPhase, TimeoutReason};
