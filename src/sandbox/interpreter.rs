//! 操作解释器：把单个 MutationOp 作用到（已拷贝的）GameState 上
//!
//! 只在 Sandbox 持有的副本上调用；卡牌定义表只读。输出行写入 `out`，供裁判在下一轮看到。

use crate::game::{CardDatabase, GameState, PlacedCard, TurnStep};
use crate::sandbox::{LibraryPosition, MutationOp, SandboxError, Target, Zone};

fn zone_mut(state: &mut GameState, player: usize, zone: Zone) -> Result<&mut Vec<String>, SandboxError> {
    let board = state.board_mut(player)?;
    Ok(match zone {
        Zone::Library => &mut board.library,
        Zone::Hand => &mut board.hand,
        Zone::Graveyard => &mut board.graveyard,
        Zone::Exile => &mut board.exile,
    })
}

fn take_from_zone(
    state: &mut GameState,
    player: usize,
    zone: Zone,
    card: &str,
) -> Result<String, SandboxError> {
    let cards = zone_mut(state, player, zone)?;
    let pos = cards
        .iter()
        .position(|c| c == card)
        .ok_or_else(|| SandboxError::CardNotInZone {
            card: card.to_string(),
            player,
            zone,
        })?;
    Ok(cards.remove(pos))
}

fn put_into_zone(
    state: &mut GameState,
    player: usize,
    zone: Zone,
    card: String,
    position: LibraryPosition,
) -> Result<(), SandboxError> {
    let cards = zone_mut(state, player, zone)?;
    match (zone, position) {
        (Zone::Library, LibraryPosition::Top) => cards.insert(0, card),
        _ => cards.push(card),
    }
    Ok(())
}

fn overflow(quantity: impl Into<String>) -> SandboxError {
    SandboxError::Overflow {
        quantity: quantity.into(),
    }
}

fn adjust_count(
    counters: &mut std::collections::BTreeMap<String, i64>,
    counter: &str,
    delta: i64,
) -> Result<i64, SandboxError> {
    let value = counters
        .get(counter)
        .copied()
        .unwrap_or(0)
        .checked_add(delta)
        .ok_or_else(|| overflow(format!("counter '{counter}'")))?;
    if value < 0 {
        return Err(SandboxError::NegativeCounter {
            counter: counter.to_string(),
            value,
        });
    }
    if value == 0 {
        counters.remove(counter);
    } else {
        counters.insert(counter.to_string(), value);
    }
    Ok(value)
}

/// 执行单个操作
pub fn apply_op(
    state: &mut GameState,
    op: &MutationOp,
    cards: &CardDatabase,
    out: &mut Vec<String>,
) -> Result<(), SandboxError> {
    match op {
        MutationOp::Draw { player, count } => {
            let board = state.board_mut(*player)?;
            for _ in 0..*count {
                if board.library.is_empty() {
                    out.push(format!(
                        "player {player} attempted to draw from an empty library"
                    ));
                    break;
                }
                let card = board.library.remove(0);
                board.hand.push(card);
            }
        }
        MutationOp::MoveCard {
            player,
            card,
            from,
            to,
            to_player,
            position,
        } => {
            let dest = to_player.unwrap_or(*player);
            state.board(dest)?;
            let taken = take_from_zone(state, *player, *from, card)?;
            put_into_zone(state, dest, *to, taken, *position)?;
        }
        MutationOp::PutOntoBattlefield {
            player,
            card,
            from,
            tapped,
            controller,
        } => {
            let controller = controller.unwrap_or(*player);
            state.board(*player)?;
            state.board(controller)?;
            let is_token = from.is_none();
            if let Some(zone) = from {
                take_from_zone(state, *player, *zone, card)?;
            }
            let id = state.allocate_battlefield_id();
            let mut placed = PlacedCard::new(id, card.clone(), *player);
            placed.tapped = *tapped;
            placed.is_token = is_token;
            state.board_mut(controller)?.battlefield.insert(id, placed);
            out.push(format!("{card} entered the battlefield with id {id}"));
        }
        MutationOp::LeaveBattlefield { id, to } => {
            let controller = state
                .controller_of(*id)
                .ok_or(SandboxError::UnknownPermanent(*id))?;
            let placed = state
                .board_mut(controller)?
                .battlefield
                .remove(id)
                .ok_or(SandboxError::UnknownPermanent(*id))?;
            for board in &mut state.player_boards {
                for other in board.battlefield.values_mut() {
                    if other.attached_to == Some(*id) {
                        other.attached_to = None;
                    }
                }
            }
            if placed.is_token {
                out.push(format!("token {} (id {id}) ceased to exist", placed.card));
            } else {
                put_into_zone(state, placed.owner, *to, placed.card, LibraryPosition::Top)?;
            }
        }
        MutationOp::Tap { id } => state.permanent_mut(*id)?.tapped = true,
        MutationOp::Untap { id } => state.permanent_mut(*id)?.tapped = false,
        MutationOp::UntapAll { player } => state.board_mut(*player)?.untap_all(),
        MutationOp::DealDamage { target, amount } => match target {
            Target::Player { player } => {
                let board = state.board_mut(*player)?;
                board.life = board
                    .life
                    .checked_sub(i64::from(*amount))
                    .ok_or_else(|| overflow(format!("player {player}'s life")))?;
            }
            Target::Permanent { id } => {
                let placed = state.permanent_mut(*id)?;
                placed.marked_damage = placed
                    .marked_damage
                    .checked_add(*amount)
                    .ok_or_else(|| overflow(format!("damage on permanent {id}")))?;
            }
        },
        MutationOp::AdjustLife { player, delta } => {
            let board = state.board_mut(*player)?;
            board.life = board
                .life
                .checked_add(*delta)
                .ok_or_else(|| overflow(format!("player {player}'s life")))?;
        }
        MutationOp::AdjustCounter {
            target,
            counter,
            delta,
        } => {
            let counters = match target {
                Target::Player { player } => &mut state.board_mut(*player)?.counters,
                Target::Permanent { id } => &mut state.permanent_mut(*id)?.counters,
            };
            adjust_count(counters, counter, *delta)?;
        }
        MutationOp::Attach { id, to } => {
            if let Some(host) = to {
                if host == id {
                    return Err(SandboxError::SelfAttachment(*id));
                }
                state.permanent(*host)?;
            }
            state.permanent_mut(*id)?.attached_to = *to;
        }
        MutationOp::AddEffect { id, effect } => {
            state.permanent_mut(*id)?.effects.push(effect.clone());
        }
        MutationOp::ClearEffects { id } => state.permanent_mut(*id)?.effects.clear(),
        MutationOp::ClearDamage => state.cleanup_damage(),
        MutationOp::PushStack { description } => state.stack.push(description.clone()),
        MutationOp::PopStack => {
            let top = state.stack.pop().ok_or(SandboxError::EmptyStack)?;
            out.push(format!("resolved from stack: {top}"));
        }
        MutationOp::SetStep { step } => state.turn_step = *step,
        MutationOp::NextTurn => {
            let players = state.player_count().max(1);
            state.turn_number += 1;
            state.active_player = (state.active_player + 1) % players;
            state.turn_step = TurnStep::Untap;
        }
        MutationOp::Look { player, count } => {
            let board = state.board(*player)?;
            let top: Vec<&String> = board.library.iter().take(*count as usize).collect();
            out.push(format!(
                "top {} of player {player}'s library:",
                top.len()
            ));
            for card in top {
                out.push(cards.format_card(card));
            }
        }
        MutationOp::Inspect { card } => out.push(cards.format_card(card)),
        MutationOp::Log { message } => out.push(message.clone()),
    }
    Ok(())
}
