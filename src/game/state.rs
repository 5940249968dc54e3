//! 对局状态：玩家面板、战场永久物、回合阶段
//!
//! GameState 是唯一权威状态；任何试探性修改都在深拷贝上进行（见 sandbox），
//! 只有 StateStore::commit 才会替换它。战场使用 BTreeMap 保证序列化顺序稳定，
//! 从而让 content_hash 可以用于共识投票时的结构相等比较。

use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sandbox::SandboxError;

/// 开局生命值
pub const STARTING_LIFE: i64 = 20;
/// 开局手牌数
pub const OPENING_HAND_SIZE: usize = 7;

/// 套牌：主牌与备牌（牌名 -> 张数）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckList {
    #[serde(default)]
    pub mainboard: BTreeMap<String, u32>,
    #[serde(default)]
    pub sideboard: BTreeMap<String, u32>,
}

impl DeckList {
    /// 展开主牌为单卡列表（按牌名排序，未洗牌）
    pub fn expand_mainboard(&self) -> Vec<String> {
        self.mainboard
            .iter()
            .flat_map(|(name, count)| std::iter::repeat(name.clone()).take(*count as usize))
            .collect()
    }
}

/// 回合步骤
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnStep {
    #[default]
    Untap,
    Upkeep,
    Draw,
    #[serde(rename = "MAIN_1")]
    Main1,
    BeginCombat,
    DeclareAttackers,
    DeclareBlockers,
    FirstStrikeDamage,
    CombatDamage,
    EndCombat,
    #[serde(rename = "MAIN_2")]
    Main2,
    End,
    Cleanup,
}

/// 战场上的一张牌（永久物）；id 单调分配、永不复用，离场即作废
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedCard {
    pub id: u32,
    pub card: String,
    pub owner: usize,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub tapped: bool,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub attached_to: Option<u32>,
    #[serde(default)]
    pub marked_damage: u32,
    /// 衍生物离场后不进入任何区域
    #[serde(default)]
    pub is_token: bool,
}

impl PlacedCard {
    pub fn new(id: u32, card: impl Into<String>, owner: usize) -> Self {
        Self {
            id,
            card: card.into(),
            owner,
            counters: BTreeMap::new(),
            tapped: false,
            effects: Vec::new(),
            attached_to: None,
            marked_damage: 0,
            is_token: false,
        }
    }
}

/// 单个玩家的面板
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBoard {
    /// 牌库，下标 0 为顶
    pub library: Vec<String>,
    pub hand: Vec<String>,
    pub graveyard: Vec<String>,
    pub exile: Vec<String>,
    pub life: i64,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    /// 该玩家操控的永久物
    #[serde(default)]
    pub battlefield: BTreeMap<u32, PlacedCard>,
}

impl PlayerBoard {
    pub fn new(library: Vec<String>) -> Self {
        Self {
            library,
            hand: Vec::new(),
            graveyard: Vec::new(),
            exile: Vec::new(),
            life: STARTING_LIFE,
            counters: BTreeMap::new(),
            battlefield: BTreeMap::new(),
        }
    }

    pub fn untap_all(&mut self) {
        for placed in self.battlefield.values_mut() {
            placed.tapped = false;
        }
    }
}

/// 权威对局状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub player_boards: Vec<PlayerBoard>,
    /// 等待结算的效果（栈顶为末尾）
    #[serde(default)]
    pub stack: Vec<String>,
    pub next_battlefield_id: u32,
    pub active_player: usize,
    pub turn_step: TurnStep,
    pub turn_number: u32,
    #[serde(default)]
    pub player_decklists: Vec<DeckList>,
}

impl GameState {
    /// 用给定牌库直接构造（不洗牌、不抓起手），主要用于测试与恢复
    pub fn with_libraries(libraries: Vec<Vec<String>>) -> Self {
        Self {
            player_boards: libraries.into_iter().map(PlayerBoard::new).collect(),
            stack: Vec::new(),
            next_battlefield_id: 0,
            active_player: 0,
            turn_step: TurnStep::Untap,
            turn_number: 1,
            player_decklists: Vec::new(),
        }
    }

    /// 按套牌开局：洗牌、每人抓 7 张，回合 1、玩家 0 先手
    pub fn from_decklists<R: Rng + ?Sized>(decklists: &[DeckList], rng: &mut R) -> Self {
        let libraries = decklists
            .iter()
            .map(|deck| {
                let mut library = deck.expand_mainboard();
                library.shuffle(rng);
                library
            })
            .collect();
        let mut state = Self::with_libraries(libraries);
        for board in &mut state.player_boards {
            let n = OPENING_HAND_SIZE.min(board.library.len());
            board.hand = board.library.drain(..n).collect();
        }
        state.player_decklists = decklists.to_vec();
        state
    }

    pub fn player_count(&self) -> usize {
        self.player_boards.len()
    }

    pub fn board(&self, player: usize) -> Result<&PlayerBoard, SandboxError> {
        self.player_boards
            .get(player)
            .ok_or(SandboxError::UnknownPlayer(player))
    }

    pub fn board_mut(&mut self, player: usize) -> Result<&mut PlayerBoard, SandboxError> {
        self.player_boards
            .get_mut(player)
            .ok_or(SandboxError::UnknownPlayer(player))
    }

    /// 查找永久物所在面板（操控者）
    pub fn controller_of(&self, id: u32) -> Option<usize> {
        self.player_boards
            .iter()
            .position(|b| b.battlefield.contains_key(&id))
    }

    pub fn permanent(&self, id: u32) -> Result<&PlacedCard, SandboxError> {
        self.player_boards
            .iter()
            .find_map(|b| b.battlefield.get(&id))
            .ok_or(SandboxError::UnknownPermanent(id))
    }

    pub fn permanent_mut(&mut self, id: u32) -> Result<&mut PlacedCard, SandboxError> {
        self.player_boards
            .iter_mut()
            .find_map(|b| b.battlefield.get_mut(&id))
            .ok_or(SandboxError::UnknownPermanent(id))
    }

    /// 分配新的战场 id（单调递增，永不复用）
    pub fn allocate_battlefield_id(&mut self) -> u32 {
        let id = self.next_battlefield_id;
        self.next_battlefield_id += 1;
        id
    }

    /// 清除所有永久物上的伤害（清除步骤）
    pub fn cleanup_damage(&mut self) {
        for board in &mut self.player_boards {
            for placed in board.battlefield.values_mut() {
                placed.marked_damage = 0;
            }
        }
    }

    /// 校验战场 id 不变量：唯一归属、与键一致、小于下一个 id、贴附目标存在
    pub fn check_invariants(&self) -> Result<(), SandboxError> {
        let mut seen = HashSet::new();
        for board in &self.player_boards {
            for (key, placed) in &board.battlefield {
                if *key != placed.id {
                    return Err(SandboxError::Invariant(format!(
                        "battlefield key {} holds permanent with id {}",
                        key, placed.id
                    )));
                }
                if placed.id >= self.next_battlefield_id {
                    return Err(SandboxError::Invariant(format!(
                        "permanent id {} was never allocated",
                        placed.id
                    )));
                }
                if !seen.insert(placed.id) {
                    return Err(SandboxError::Invariant(format!(
                        "permanent id {} appears on more than one battlefield",
                        placed.id
                    )));
                }
            }
        }
        for board in &self.player_boards {
            for placed in board.battlefield.values() {
                if let Some(target) = placed.attached_to {
                    if !seen.contains(&target) {
                        return Err(SandboxError::Invariant(format!(
                            "permanent {} is attached to missing permanent {}",
                            placed.id, target
                        )));
                    }
                }
            }
        }
        if self.active_player >= self.player_count() {
            return Err(SandboxError::UnknownPlayer(self.active_player));
        }
        Ok(())
    }

    /// 结构内容哈希（序列化后 sha256），共识投票以此比较候选状态是否相等
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn deck(cards: &[(&str, u32)]) -> DeckList {
        DeckList {
            mainboard: cards.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
            sideboard: BTreeMap::new(),
        }
    }

    #[test]
    fn test_from_decklists_deals_opening_hands() {
        let decks = vec![deck(&[("Forest", 20), ("Llanowar Elves", 20)]); 2];
        let mut rng = StdRng::seed_from_u64(7);
        let state = GameState::from_decklists(&decks, &mut rng);

        assert_eq!(state.turn_number, 1);
        assert_eq!(state.active_player, 0);
        assert_eq!(state.player_count(), 2);
        for board in &state.player_boards {
            assert_eq!(board.life, 20);
            assert_eq!(board.hand.len(), 7);
            assert_eq!(board.library.len(), 33);
            assert!(board.battlefield.is_empty());
        }
    }

    #[test]
    fn test_sample_deck_parses() {
        let deck: DeckList = serde_json::from_str(include_str!("../../data/deck.json")).unwrap();
        assert_eq!(deck.expand_mainboard().len(), 60);
    }

    #[test]
    fn test_content_hash_tracks_structure() {
        let a = GameState::with_libraries(vec![vec!["Forest".into()], vec![]]);
        let mut b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());
        b.player_boards[1].life -= 1;
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_invariants_reject_dangling_attachment() {
        let mut state = GameState::with_libraries(vec![vec![], vec![]]);
        let id = state.allocate_battlefield_id();
        let mut aura = PlacedCard::new(id, "Rancor", 0);
        aura.attached_to = Some(42);
        state.player_boards[0].battlefield.insert(id, aura);
        assert!(matches!(
            state.check_invariants(),
            Err(SandboxError::Invariant(_))
        ));
    }

    #[test]
    fn test_invariants_reject_duplicate_id() {
        let mut state = GameState::with_libraries(vec![vec![], vec![]]);
        let id = state.allocate_battlefield_id();
        state.player_boards[0]
            .battlefield
            .insert(id, PlacedCard::new(id, "Forest", 0));
        state.player_boards[1]
            .battlefield
            .insert(id, PlacedCard::new(id, "Forest", 1));
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn test_turn_step_wire_names() {
        assert_eq!(serde_json::to_string(&TurnStep::Main1).unwrap(), "\"MAIN_1\"");
        assert_eq!(
            serde_json::to_string(&TurnStep::DeclareAttackers).unwrap(),
            "\"DECLARE_ATTACKERS\""
        );
    }
}
