//! 对局数据层：状态模型、卡牌定义表、视图渲染、权威状态仓库

pub mod cards;
pub mod state;
pub mod store;
pub mod view;

pub use cards::{CardDatabase, CardInfo, StatValue};
pub use state::{DeckList, GameState, PlacedCard, PlayerBoard, TurnStep};
pub use store::{ActionRecord, StateStore};
pub use view::{render_omniscient, render_player_view};
