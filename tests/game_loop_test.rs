//! 对局主控集成测试：脚本化裁判 + 脚本化玩家 + 内存 / 文件存储

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use judge::agent::{Agent, ScriptedAgent};
use judge::config::SessionSection;
use judge::core::{GameMaster, JudgeError, SessionOutcome, SessionSupervisor, TimeoutReason};
use judge::game::{CardDatabase, DeckList, GameState};
use judge::llm::LlmError;
use judge::oracle::{
    majority, AdvanceReply, AnalysisReply, ConsensusEngine, ScriptedOracle, ValidationReply,
};
use judge::sandbox::{MutationOp, MutationScript, Sandbox};
use judge::storage::{FileSessionStore, MemorySessionStore, SessionStore};

const SAMPLES: usize = 8;

fn initial_state() -> GameState {
    let mut state = GameState::with_libraries(vec![
        vec!["Island".into(), "Island".into(), "Counterspell".into()],
        vec!["Mountain".into(), "Lightning Bolt".into()],
    ]);
    state.player_boards[0].hand = vec!["Counterspell".into()];
    state
}

/// 两套 40 张的套牌洗牌发出 7 张起手，生命 20，战场为空
fn dealt_state() -> GameState {
    let mainboard: BTreeMap<String, u32> = [("Forest", 20), ("Grizzly Bears", 20)]
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    let deck = DeckList {
        mainboard,
        sideboard: BTreeMap::new(),
    };
    GameState::from_decklists(&[deck.clone(), deck], &mut StdRng::seed_from_u64(42))
}

fn advance(priority_player: usize, ops: Vec<MutationOp>) -> Result<AdvanceReply, LlmError> {
    Ok(AdvanceReply {
        reasoning: String::new(),
        priority_player,
        mutation_script: MutationScript::new(ops),
    })
}

fn analysis(priority_player: usize, winner: Option<usize>) -> Result<AnalysisReply, LlmError> {
    Ok(AnalysisReply {
        reasoning: String::new(),
        priority_player,
        revealed_information: String::new(),
        available_mana: "U".into(),
        available_actions: "Pass".into(),
        winner,
    })
}

fn valid(ops: Vec<MutationOp>) -> Result<ValidationReply, LlmError> {
    Ok(ValidationReply {
        reasoning: String::new(),
        is_action_valid: true,
        invalid_action_feedback: None,
        mutation_script: Some(MutationScript::new(ops)),
        winner: None,
    })
}

fn invalid(feedback: &str) -> Result<ValidationReply, LlmError> {
    Ok(ValidationReply {
        reasoning: String::new(),
        is_action_valid: false,
        invalid_action_feedback: Some(feedback.to_string()),
        mutation_script: None,
        winner: None,
    })
}

/// 前 n 个采样用 first，之后（队列耗尽后重复最后一条）用 then
fn batch<T: Clone>(first: T, then: T) -> Vec<T> {
    let mut v = vec![first; SAMPLES];
    v.push(then);
    v
}

fn engine(oracle: &Arc<ScriptedOracle>) -> ConsensusEngine {
    ConsensusEngine::new(
        oracle.clone(),
        Sandbox::new(Arc::new(CardDatabase::new())),
        SAMPLES,
        5,
    )
}

fn session(max_turns: u32) -> SessionSection {
    SessionSection {
        max_turns,
        ..SessionSection::default()
    }
}

fn agents(a: &Arc<ScriptedAgent>, b: &Arc<ScriptedAgent>) -> Vec<Arc<dyn Agent>> {
    vec![a.clone() as Arc<dyn Agent>, b.clone() as Arc<dyn Agent>]
}

#[tokio::test]
async fn test_winner_after_first_step() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_advances(vec![advance(0, vec![])])
            .with_analyses(vec![analysis(0, Some(0))]),
    );
    let store = Arc::new(MemorySessionStore::new());
    let (p0, p1) = (Arc::new(ScriptedAgent::default()), Arc::new(ScriptedAgent::default()));

    let initial = dealt_state();
    for board in &initial.player_boards {
        assert_eq!(board.life, 20);
        assert_eq!(board.hand.len(), 7);
        assert!(board.battlefield.is_empty());
    }

    let mut gm = GameMaster::new(
        "game-win",
        initial.clone(),
        engine(&oracle),
        agents(&p0, &p1),
        store.clone(),
        &session(30),
    )
    .unwrap();

    let outcome = gm.game_loop().await.unwrap();
    assert_eq!(outcome, SessionOutcome::Winner { player: 0 });
    assert_eq!(gm.step_count(), 1);
    assert_eq!(p0.turns_taken() + p1.turns_taken(), 0);
    // 第一步没有玩家行动，不发起校验
    assert_eq!(oracle.calls(), (0, SAMPLES, SAMPLES));
    assert_eq!(gm.state(), &initial);

    let record = store.load_finished("game-win").await.unwrap().unwrap();
    assert_eq!(record.winner, Some(0));
    assert!(store.list_ongoing().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_action_feedback_keeps_initiative() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_validations(batch(invalid("not enough mana"), valid(vec![])))
            .with_advances(vec![advance(0, vec![])])
            .with_analyses(batch(analysis(0, None), analysis(1, Some(1)))),
    );
    let store = Arc::new(MemorySessionStore::new());
    let p0 = Arc::new(ScriptedAgent::new(["Cast Counterspell", "Pass"]));
    let p1 = Arc::new(ScriptedAgent::default());

    let mut gm = GameMaster::new(
        "game-invalid",
        initial_state(),
        engine(&oracle),
        agents(&p0, &p1),
        store.clone(),
        &session(30),
    )
    .unwrap();

    let outcome = gm.game_loop().await.unwrap();
    assert_eq!(outcome.winner(), Some(1));

    // 被驳回后仍是玩家 0 行动，并收到反馈
    assert_eq!(
        p0.feedback_seen(),
        vec![None, Some("not enough mana".to_string())]
    );
    assert_eq!(p1.turns_taken(), 0);

    let record = store.load_finished("game-invalid").await.unwrap().unwrap();
    assert_eq!(record.error_count, 1);
    assert!(record.error_messages[0].contains("not enough mana"));
    assert_eq!(record.action_log.len(), 1);
    assert_eq!(record.action_log[0].participant, 0);
    assert_eq!(record.action_log[0].action, "Pass");
    assert_eq!(record.player_observation_histories[0].len(), 2);
    // 非法行动不推进：只有两次分析
    assert_eq!(record.step_count, 2);
}

#[tokio::test]
async fn test_turn_budget_ends_without_winner() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_advances(vec![advance(1, vec![MutationOp::NextTurn])])
            .with_analyses(vec![analysis(1, None)]),
    );
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSessionStore::new(dir.path()).unwrap());
    let (p0, p1) = (Arc::new(ScriptedAgent::default()), Arc::new(ScriptedAgent::default()));

    let mut gm = GameMaster::new(
        "game-timeout",
        dealt_state(),
        engine(&oracle),
        agents(&p0, &p1),
        store.clone(),
        &session(1),
    )
    .unwrap();

    let outcome = gm.game_loop().await.unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Timeout {
            reason: TimeoutReason::TurnLimit
        }
    );
    assert_eq!(outcome.winner(), None);
    assert_eq!(gm.state().turn_number, 2);
    assert_eq!(gm.state().active_player, 1);

    let record = store.load_finished("game-timeout").await.unwrap().unwrap();
    assert_eq!(record.winner, None);
    assert!(store.load_ongoing("game-timeout").await.unwrap().is_none());
}

#[tokio::test]
async fn test_error_budget_times_out() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_validations(vec![invalid("wrong step")])
            .with_advances(vec![advance(0, vec![])])
            .with_analyses(vec![analysis(0, None)]),
    );
    let store = Arc::new(MemorySessionStore::new());
    let p0 = Arc::new(ScriptedAgent::new(["Attack with everything"]));
    let p1 = Arc::new(ScriptedAgent::default());

    let mut gm = GameMaster::new(
        "game-errors",
        initial_state(),
        engine(&oracle),
        agents(&p0, &p1),
        store.clone(),
        &SessionSection {
            max_errors: 0,
            ..SessionSection::default()
        },
    )
    .unwrap();

    let outcome = gm.game_loop().await.unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Timeout {
            reason: TimeoutReason::ErrorLimit
        }
    );
    assert_eq!(gm.error_count(), 1);
    assert!(store.load_finished("game-errors").await.unwrap().is_some());
}

#[tokio::test]
async fn test_committed_state_equals_voted_candidate() {
    let script = vec![
        MutationOp::Draw { player: 0, count: 1 },
        MutationOp::AdjustLife { player: 1, delta: -3 },
    ];
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_advances(vec![advance(0, script.clone())])
            .with_analyses(vec![analysis(0, Some(0))]),
    );
    let store = Arc::new(MemorySessionStore::new());
    let (p0, p1) = (Arc::new(ScriptedAgent::default()), Arc::new(ScriptedAgent::default()));

    let base = initial_state();
    let expected = Sandbox::new(Arc::new(CardDatabase::new()))
        .apply(&base, &MutationScript::new(script))
        .into_state()
        .unwrap();

    let mut gm = GameMaster::new(
        "game-commit",
        base.clone(),
        engine(&oracle),
        agents(&p0, &p1),
        store.clone(),
        &session(30),
    )
    .unwrap();
    gm.game_loop().await.unwrap();

    assert_eq!(gm.state(), &expected);
    assert_eq!(gm.state().content_hash(), expected.content_hash());
    assert_eq!(gm.state_store().past_states(), vec![base]);
}

#[test]
fn test_failed_script_rollback_is_idempotent() {
    let sandbox = Sandbox::new(Arc::new(CardDatabase::new()));
    let base = initial_state();
    let snapshot = base.clone();
    let script = MutationScript::new(vec![
        MutationOp::Draw { player: 0, count: 1 },
        MutationOp::Tap { id: 99 },
    ]);

    for _ in 0..3 {
        let outcome = sandbox.apply(&base, &script);
        assert!(!outcome.is_ok());
        assert_eq!(base, snapshot);
    }
}

#[test]
fn test_consensus_choice_is_repeatable() {
    let replies = vec![
        (Some(1), 0),
        (None, 1),
        (None, 1),
        (Some(1), 0),
        (None, 0),
        (Some(1), 0),
        (None, 1),
        (None, 0),
    ];
    // (None,1) 与 (Some(1),0) 各 3 票，取序号更小的 0 号采样
    for _ in 0..20 {
        assert_eq!(majority(&replies), Some((0, 3)));
    }
}

#[tokio::test]
async fn test_cancelled_session_is_not_persisted() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_advances(vec![advance(0, vec![])])
            .with_analyses(vec![analysis(0, Some(0))]),
    );
    let store = Arc::new(MemorySessionStore::new());
    let (p0, p1) = (Arc::new(ScriptedAgent::default()), Arc::new(ScriptedAgent::default()));
    let supervisor = SessionSupervisor::new();
    supervisor.cancel();

    let mut gm = GameMaster::new(
        "game-cancel",
        initial_state(),
        engine(&oracle),
        agents(&p0, &p1),
        store.clone(),
        &session(30),
    )
    .unwrap()
    .with_supervisor(supervisor);

    assert_eq!(gm.game_loop().await.unwrap(), SessionOutcome::Cancelled);
    assert!(store.list_ongoing().await.unwrap().is_empty());
    assert!(store.list_finished().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_from_checkpoint_after_abort() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSessionStore::new(dir.path()).unwrap());

    // 第一次运行：第一步完成后，校验遇到不可恢复错误
    let failing = Arc::new(
        ScriptedOracle::new()
            .with_validations(vec![Err(LlmError::ApiError("invalid api key".into()))])
            .with_advances(vec![advance(1, vec![MutationOp::Draw { player: 1, count: 1 }])])
            .with_analyses(vec![analysis(1, None)]),
    );
    let p0 = Arc::new(ScriptedAgent::default());
    let p1 = Arc::new(ScriptedAgent::new(["Play Mountain"]));
    let mut gm = GameMaster::new(
        "game-resume",
        initial_state(),
        engine(&failing),
        agents(&p0, &p1),
        store.clone(),
        &session(30),
    )
    .unwrap();
    let err = gm.game_loop().await.unwrap_err();
    assert!(matches!(err, JudgeError::Oracle(LlmError::ApiError(_))));

    let record = store.load_ongoing("game-resume").await.unwrap().unwrap();
    assert_eq!(record.step_count, 1);
    assert_eq!(record.priority_player, 1);
    assert_eq!(record.game_state.player_boards[1].hand, vec!["Mountain".to_string()]);

    // 第二次运行：从检查点继续，玩家 1 重新行动
    let healthy = Arc::new(
        ScriptedOracle::new()
            .with_validations(vec![valid(vec![MutationOp::PutOntoBattlefield {
                player: 1,
                card: "Mountain".into(),
                from: Some(judge::sandbox::Zone::Hand),
                tapped: false,
                controller: None,
            }])])
            .with_advances(vec![advance(1, vec![])])
            .with_analyses(vec![analysis(1, Some(1))]),
    );
    let p1_again = Arc::new(ScriptedAgent::new(["Play Mountain"]));
    let mut resumed = GameMaster::resume(
        record,
        engine(&healthy),
        agents(&p0, &p1_again),
        store.clone(),
        &session(30),
    )
    .unwrap();

    let outcome = resumed.game_loop().await.unwrap();
    assert_eq!(outcome.winner(), Some(1));
    assert_eq!(p1_again.turns_taken(), 1);
    assert_eq!(resumed.state().player_boards[1].battlefield.len(), 1);

    let finished = store.load_finished("game-resume").await.unwrap().unwrap();
    assert_eq!(finished.step_count, 2);
    assert_eq!(finished.action_log.len(), 1);
    assert!(store.list_ongoing().await.unwrap().is_empty());
}
