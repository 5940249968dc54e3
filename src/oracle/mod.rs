//! 裁判：回复结构、LLM 实现、测试替身与共识引擎

pub mod consensus;
pub mod llm_oracle;
pub mod mock;
pub mod prompts;
pub mod schema;
pub mod traits;

pub use consensus::{majority, ConsensusEngine, ConsensusResult, Tally};
pub use llm_oracle::LlmOracle;
pub use mock::ScriptedOracle;
pub use schema::{AdvanceReply, AnalysisReply, ValidationReply};
pub use traits::{Oracle, OracleContext};
