//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JUDGE__*` 覆盖（双下划线表示嵌套，如 `JUDGE__ORACLE__CONSENSUS_SAMPLES=4`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub oracle: OracleSection,
    pub retry: RetrySection,
    pub cache: CacheSection,
    pub session: SessionSection,
    /// 每个座位一个条目；缺省时两名玩家都使用 [llm] 的模型
    pub players: Vec<PlayerSection>,
}

/// [app] 段：数据目录、卡牌库、套牌与批量对局数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 对局记录根目录（其下 ongoing_games / finished_games）
    pub data_dir: PathBuf,
    /// 卡牌定义 JSON
    pub card_db: Option<PathBuf>,
    /// 两名玩家的套牌 JSON；只给一个时双方镜像
    pub decks: Vec<PathBuf>,
    /// 并发运行的对局数
    pub games: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("database"),
            card_db: None,
            decks: Vec::new(),
            games: 1,
        }
    }
}

/// [llm] 段：裁判模型与端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: None,
            temperature: Some(1.0),
        }
    }
}

/// [oracle] 段：共识采样数与脚本失败后的批量重试上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub consensus_samples: usize,
    pub max_script_attempts: u32,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            consensus_samples: 8,
            max_script_attempts: 5,
        }
    }
}

/// [retry] 段：瞬时错误退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_jitter_ms: 500,
        }
    }
}

/// [cache] 段：请求缓存
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    /// 未设置时只缓存在内存
    pub dir: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: Some(PathBuf::from("cache")),
        }
    }
}

/// [session] 段：会话级熔断与历史长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_turns: u32,
    pub max_errors: usize,
    pub max_actions: usize,
    /// 检查点中保留的历史状态数
    pub history_limit: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_turns: 30,
            max_errors: 50,
            max_actions: 500,
            history_limit: 10,
        }
    }
}

/// [[players]] 条目：玩家使用的模型
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSection {
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// 从 config 目录加载配置，环境变量 JUDGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 JUDGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JUDGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.oracle.consensus_samples, 8);
        assert_eq!(cfg.session.max_turns, 30);
        assert_eq!(cfg.app.data_dir, PathBuf::from("database"));
        assert!(cfg.players.is_empty());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judge.toml");
        std::fs::write(
            &path,
            r#"
[oracle]
consensus_samples = 3

[session]
max_turns = 12

[[players]]
model = "o3-mini"

[[players]]
model = "claude-sonnet-4-20250514"
temperature = 1.0
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.oracle.consensus_samples, 3);
        assert_eq!(cfg.oracle.max_script_attempts, 5);
        assert_eq!(cfg.session.max_turns, 12);
        assert_eq!(cfg.session.max_errors, 50);
        assert_eq!(cfg.players.len(), 2);
        assert_eq!(cfg.players[1].temperature, Some(1.0));
    }
}
