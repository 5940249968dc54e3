//! Judge - 由 LLM 裁判驱动的双人卡牌对局编排
//!
//! 模块划分：
//! - **agent**: 玩家代理（LLM 玩家 / 脚本化玩家）与观察历史
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 对局主控状态机、错误与恢复、会话监管
//! - **game**: 对局状态、卡牌定义、视图渲染、状态仓库
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）及重试、缓存包装层
//! - **observability**: 日志初始化
//! - **oracle**: 裁判调用、回复结构与多数共识
//! - **sandbox**: 变更脚本与可回滚的执行沙箱
//! - **storage**: 对局检查点与持久化

pub mod agent;
pub mod config;
pub mod core;
pub mod game;
pub mod llm;
pub mod observability;
pub mod oracle;
pub mod sandbox;
pub mod storage;
