//! 持久化：对局检查点记录与存储后端（文件 / 内存）

pub mod record;
pub mod session_store;

pub use record::{AgentDescriptor, SessionRecord};
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore, StorageError};
