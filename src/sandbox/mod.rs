//! 执行沙箱：在状态副本上解释裁判提供的变更脚本，失败即回滚（丢弃副本）

pub mod error;
pub mod executor;
pub mod interpreter;
pub mod script;

pub use error::SandboxError;
pub use executor::{ExecutionOutcome, Sandbox};
pub use script::{LibraryPosition, MutationOp, MutationScript, Target, Zone};
