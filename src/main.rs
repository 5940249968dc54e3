//! Judge - 入口
//!
//! 加载配置，构建 Caching(Retrying(OpenAi)) 客户端链，先恢复 ongoing_games 中未完成的对局，
//! 再并发运行 `app.games` 局新对局，最后按座位与模型统计已结束对局的胜场。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use futures_util::future::join_all;
use tracing::{error, info, warn};

use judge::agent::{Agent, LlmAgent};
use judge::config::{load_config, AppConfig, PlayerSection};
use judge::core::{GameMaster, SessionOutcome, SessionSupervisor};
use judge::game::{CardDatabase, DeckList, GameState};
use judge::llm::{
    CachingLlmClient, LlmClient, OpenAiClient, ResponseCache, RetryConfig, RetryingLlmClient,
    TokenUsage,
};
use judge::observability;
use judge::oracle::{ConsensusEngine, LlmOracle};
use judge::sandbox::Sandbox;
use judge::storage::{FileSessionStore, SessionStore};

/// 各局共享的运行时组件
struct Runtime {
    cfg: AppConfig,
    client: Arc<dyn LlmClient>,
    cards: Arc<CardDatabase>,
    store: Arc<dyn SessionStore>,
    players: Vec<PlayerSection>,
}

impl Runtime {
    fn consensus(&self) -> ConsensusEngine {
        let oracle = LlmOracle::new(
            self.client.clone(),
            self.cfg.llm.model.clone(),
            self.cfg.llm.temperature,
        );
        ConsensusEngine::new(
            Arc::new(oracle),
            Sandbox::new(self.cards.clone()),
            self.cfg.oracle.consensus_samples,
            self.cfg.oracle.max_script_attempts,
        )
    }

    fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.players
            .iter()
            .map(|p| {
                Arc::new(LlmAgent::new(self.client.clone(), p.model.clone(), p.temperature))
                    as Arc<dyn Agent>
            })
            .collect()
    }
}

fn load_decks(paths: &[impl AsRef<Path>]) -> anyhow::Result<Vec<DeckList>> {
    let mut decks = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deck {}", path.display()))?;
        let deck: DeckList = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse deck {}", path.display()))?;
        decks.push(deck);
    }
    match decks.len() {
        0 => bail!("no decks configured (set app.decks)"),
        // 单套牌时双方镜像
        1 => decks.push(decks[0].clone()),
        _ => {}
    }
    Ok(decks)
}

async fn run_session(mut gm: GameMaster) -> anyhow::Result<SessionOutcome> {
    let id = gm.session_id().to_string();
    gm.game_loop()
        .await
        .with_context(|| format!("Session {id} aborted"))
}

/// 按座位与模型统计胜场
async fn tally_wins(store: &dyn SessionStore) -> anyhow::Result<()> {
    let mut by_player: BTreeMap<usize, usize> = BTreeMap::new();
    let mut by_model: BTreeMap<String, usize> = BTreeMap::new();
    let mut games = 0;

    for id in store.list_finished().await? {
        let Some(record) = store.load_finished(&id).await? else {
            continue;
        };
        games += 1;
        if let Some(winner) = record.winner {
            *by_player.entry(winner).or_default() += 1;
            let model = record
                .agents
                .get(winner)
                .and_then(|a| a.model.clone())
                .unwrap_or_else(|| "unknown".to_string());
            *by_model.entry(model).or_default() += 1;
        }
    }

    info!(games, "Finished games");
    for (player, wins) in &by_player {
        info!(player, wins, "Wins by seat");
    }
    for (model, wins) in &by_model {
        info!(model = %model, wins, "Wins by model");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;

    let usage = TokenUsage::new();
    let base: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
        cfg.llm.base_url.as_deref(),
        None,
        usage.clone(),
    ));
    let retrying: Arc<dyn LlmClient> = Arc::new(RetryingLlmClient::new(
        base,
        RetryConfig::from_config(&cfg.retry),
    ));
    let client: Arc<dyn LlmClient> = if cfg.cache.enabled {
        let cache = match &cfg.cache.dir {
            Some(dir) => ResponseCache::with_dir(dir)
                .with_context(|| format!("Failed to create cache dir {}", dir.display()))?,
            None => ResponseCache::in_memory(),
        };
        Arc::new(CachingLlmClient::new(retrying, Arc::new(cache)))
    } else {
        retrying
    };

    let cards = match &cfg.app.card_db {
        Some(path) => CardDatabase::load(path)?,
        None => {
            warn!("No card database configured, cards render by name only");
            CardDatabase::new()
        }
    };
    let decks = load_decks(&cfg.app.decks)?;

    let store: Arc<dyn SessionStore> = Arc::new(
        FileSessionStore::new(&cfg.app.data_dir)
            .with_context(|| format!("Failed to open {}", cfg.app.data_dir.display()))?,
    );

    let mut players = cfg.players.clone();
    if players.is_empty() {
        players = vec![
            PlayerSection {
                model: cfg.llm.model.clone(),
                temperature: cfg.llm.temperature,
            };
            decks.len()
        ];
    }
    if players.len() != decks.len() {
        bail!("{} players configured for {} decks", players.len(), decks.len());
    }

    let runtime = Runtime {
        cfg: cfg.clone(),
        client,
        cards: Arc::new(cards),
        store: store.clone(),
        players,
    };

    let supervisor = SessionSupervisor::new();
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling sessions");
                supervisor.cancel();
            }
        });
    }

    let mut sessions = Vec::new();
    for id in store.list_ongoing().await? {
        let Some(record) = store.load_ongoing(&id).await? else {
            continue;
        };
        let gm = GameMaster::resume(
            record,
            runtime.consensus(),
            runtime.agents(),
            runtime.store.clone(),
            &cfg.session,
        )?
        .with_supervisor(supervisor.child());
        sessions.push(gm);
    }
    for _ in 0..cfg.app.games {
        let initial = GameState::from_decklists(&decks, &mut rand::thread_rng());
        let gm = GameMaster::new(
            uuid::Uuid::new_v4().to_string(),
            initial,
            runtime.consensus(),
            runtime.agents(),
            runtime.store.clone(),
            &cfg.session,
        )?
        .with_supervisor(supervisor.child());
        sessions.push(gm);
    }

    info!(sessions = sessions.len(), "Running sessions");
    let results = join_all(sessions.into_iter().map(run_session)).await;
    for result in results {
        match result {
            Ok(outcome) => info!(?outcome, "Session ended"),
            Err(e) => error!("{:#}", e),
        }
    }

    tally_wins(store.as_ref()).await?;

    let (prompt, completion, total) = usage.get();
    info!(prompt, completion, total, "Token usage");
    if let Some(cost) = usage.estimated_cost_usd(&cfg.llm.model) {
        info!("Estimated cost: ${:.4}", cost);
    }
    Ok(())
}
