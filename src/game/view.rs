//! 状态渲染：裁判看到的全知视图与玩家看到的受限视图
//!
//! 玩家视图隐藏对手手牌内容与双方牌库，只显示张数；公开区域（坟场、放逐、战场）完整展示。

use crate::game::{CardDatabase, GameState, PlacedCard, PlayerBoard};

fn format_placed_card(placed: &PlacedCard, cards: &CardDatabase) -> String {
    let mut lines = vec![format!("[Battlefield ID {}] (owner: player {})", placed.id, placed.owner)];
    lines.push(cards.format_card(&placed.card));
    if placed.is_token {
        lines.push("Token".to_string());
    }
    if placed.marked_damage > 0 {
        lines.push(format!("Damage: {}", placed.marked_damage));
    }
    if !placed.counters.is_empty() {
        let counters: Vec<String> = placed
            .counters
            .iter()
            .map(|(name, n)| format!("{name}: {n}"))
            .collect();
        lines.push(format!("Counters: {}", counters.join(", ")));
    }
    if placed.tapped {
        lines.push("Card is tapped".to_string());
    }
    if let Some(target) = placed.attached_to {
        lines.push(format!("Attached to: {target}"));
    }
    if !placed.effects.is_empty() {
        lines.push(format!("Effects: {}", placed.effects.join("; ")));
    }
    lines.join("\n")
}

fn format_public_zones(parts: &mut Vec<String>, board: &PlayerBoard, cards: &CardDatabase) {
    parts.push(format!("Life: {}", board.life));
    if !board.counters.is_empty() {
        let counters: Vec<String> = board
            .counters
            .iter()
            .map(|(name, n)| format!("{name}: {n}"))
            .collect();
        parts.push(format!("Player Counters: {}", counters.join(", ")));
    }
    parts.push(format!("Number of cards in library: {}", board.library.len()));
    parts.push(format!(
        "Graveyard ({}) cards: {}",
        board.graveyard.len(),
        board.graveyard.join(", ")
    ));
    parts.push(format!(
        "Exile ({}) cards: {}",
        board.exile.len(),
        board.exile.join(", ")
    ));
    parts.push(format!("Battlefield ({}) cards:", board.battlefield.len()));
    for placed in board.battlefield.values() {
        parts.push(format_placed_card(placed, cards));
    }
}

fn format_turn_header(state: &GameState) -> String {
    format!(
        "Turn {} | Step: {:?} | Active player: {}",
        state.turn_number, state.turn_step, state.active_player
    )
}

fn format_stack(parts: &mut Vec<String>, state: &GameState) {
    if state.stack.is_empty() {
        parts.push("Stack: empty".to_string());
    } else {
        parts.push(format!("Stack (top last): {}", state.stack.join(" | ")));
    }
}

/// 全知视图（裁判使用）：包含所有手牌完整信息
pub fn render_omniscient(state: &GameState, cards: &CardDatabase) -> String {
    let mut parts = vec![format_turn_header(state)];
    format_stack(&mut parts, state);
    for (index, board) in state.player_boards.iter().enumerate() {
        parts.push(format!("Player {index}:"));
        format_public_zones(&mut parts, board, cards);
        parts.push(format!(
            "Hand ({}) cards: {}",
            board.hand.len(),
            board.hand.join(", ")
        ));
        parts.push("Hand cards full info:".to_string());
        for card in &board.hand {
            parts.push(cards.format_card(card));
        }
    }
    parts.join("\n")
}

/// 玩家视图：只展示自己的手牌，对手手牌仅显示张数；附加裁判揭示给该玩家的信息
pub fn render_player_view(
    state: &GameState,
    player: usize,
    cards: &CardDatabase,
    revealed_information: &str,
) -> String {
    let mut parts = vec![
        format!("You are player {player}."),
        format_turn_header(state),
    ];
    format_stack(&mut parts, state);
    for (index, board) in state.player_boards.iter().enumerate() {
        if index == player {
            parts.push(format!("Player {index} (you):"));
        } else {
            parts.push(format!("Player {index} (opponent):"));
        }
        format_public_zones(&mut parts, board, cards);
        if index == player {
            parts.push(format!("Your hand ({}) cards:", board.hand.len()));
            for card in &board.hand {
                parts.push(cards.format_card(card));
            }
        } else {
            parts.push(format!("Opponent hand: {} cards", board.hand.len()));
        }
    }
    if !revealed_information.trim().is_empty() {
        parts.push(format!("Revealed to you: {revealed_information}"));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> GameState {
        let mut state = GameState::with_libraries(vec![
            vec!["Secret Top Card".into()],
            vec!["Other Secret".into()],
        ]);
        state.player_boards[0].hand = vec!["Lightning Bolt".into()];
        state.player_boards[1].hand = vec!["Counterspell".into()];
        state
    }

    #[test]
    fn test_player_view_hides_opponent_hand_and_libraries() {
        let state = sample_state();
        let view = render_player_view(&state, 0, &CardDatabase::new(), "");
        assert!(view.contains("Lightning Bolt"));
        assert!(!view.contains("Counterspell"));
        assert!(!view.contains("Secret Top Card"));
        assert!(view.contains("Opponent hand: 1 cards"));
    }

    #[test]
    fn test_omniscient_view_shows_all_hands() {
        let state = sample_state();
        let view = render_omniscient(&state, &CardDatabase::new());
        assert!(view.contains("Lightning Bolt"));
        assert!(view.contains("Counterspell"));
    }
}
