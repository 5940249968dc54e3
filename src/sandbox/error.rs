//! 沙箱执行错误

use thiserror::Error;

use crate::sandbox::Zone;

/// 脚本执行失败的原因；任何一种都会让整个脚本作废
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("unknown player index {0}")]
    UnknownPlayer(usize),

    #[error("no permanent with battlefield id {0}")]
    UnknownPermanent(u32),

    #[error("card '{card}' is not in player {player}'s {zone}")]
    CardNotInZone {
        card: String,
        player: usize,
        zone: Zone,
    },

    #[error("counter '{counter}' would drop below zero ({value})")]
    NegativeCounter { counter: String, value: i64 },

    #[error("{quantity} would overflow")]
    Overflow { quantity: String },

    #[error("permanent {0} cannot be attached to itself")]
    SelfAttachment(u32),

    #[error("the stack is empty")]
    EmptyStack,

    #[error("state invariant violated: {0}")]
    Invariant(String),

    #[error("op #{index} ({op}) failed: {source}")]
    AtOp {
        index: usize,
        op: &'static str,
        #[source]
        source: Box<SandboxError>,
    },
}
