//! 卡牌定义表（只读）
//!
//! 从 JSON（牌名 -> 卡牌信息）加载；沙箱脚本与状态渲染只读访问。衍生物等未收录的牌名仅按名称渲染。

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// 力量/防御力/忠诚度在数据源中可能是数字或字符串（如 "*"）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Number(n) => write!(f, "{n}"),
            StatValue::Text(s) => f.write_str(s),
        }
    }
}

/// 单张卡牌的静态信息
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub name: String,
    #[serde(default)]
    pub mana_cost: Option<String>,
    #[serde(default)]
    pub mana_value: Option<i64>,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub subtypes: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub power: Option<StatValue>,
    #[serde(default)]
    pub toughness: Option<StatValue>,
    #[serde(default)]
    pub loyalty: Option<StatValue>,
}

impl CardInfo {
    pub fn type_line(&self) -> String {
        let mut parts: Vec<&str> = self
            .supertypes
            .iter()
            .chain(self.types.iter())
            .map(String::as_str)
            .collect();
        if !self.subtypes.is_empty() {
            parts.push("-");
            parts.extend(self.subtypes.iter().map(String::as_str));
        }
        parts.join(" ")
    }

    /// 完整文本：名称、费用、类别、规则叙述、身材
    pub fn format_full(&self) -> String {
        let mut lines = vec![format!("Name: {}", self.name)];
        if let Some(cost) = &self.mana_cost {
            lines.push(format!("Cost: {cost}"));
        }
        lines.push(format!("Type: {}", self.type_line()));
        if let Some(text) = &self.text {
            lines.push(format!("Rules Text: {text}"));
        }
        let mut stats = Vec::new();
        if let (Some(p), Some(t)) = (&self.power, &self.toughness) {
            stats.push(format!("{p}/{t}"));
        }
        if let Some(l) = &self.loyalty {
            stats.push(format!("Loyalty: {l}"));
        }
        if !stats.is_empty() {
            lines.push(format!("Stats: {}", stats.join(" ")));
        }
        lines.join("\n")
    }
}

#[derive(Deserialize)]
struct CardFile {
    data: HashMap<String, CardInfo>,
}

/// 卡牌定义表
#[derive(Clone, Debug, Default)]
pub struct CardDatabase {
    cards: HashMap<String, CardInfo>,
}

impl CardDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 `{"data": {"牌名": {...}}}` 格式的 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let file: CardFile = serde_json::from_str(&raw)?;
        tracing::info!(
            "Loaded {} card definitions from {}",
            file.data.len(),
            path.as_ref().display()
        );
        Ok(Self { cards: file.data })
    }

    pub fn from_cards(cards: impl IntoIterator<Item = CardInfo>) -> Self {
        Self {
            cards: cards.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CardInfo> {
        self.cards.get(name)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// 渲染卡牌完整信息；未收录（如衍生物）时只输出名称
    pub fn format_card(&self, name: &str) -> String {
        match self.get(name) {
            Some(info) => info.format_full(),
            None => format!("Name: {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_stats() {
        let raw = r#"{"data": {"Tarmogoyf": {
            "name": "Tarmogoyf", "manaCost": "{1}{G}", "manaValue": 2,
            "types": ["Creature"], "subtypes": ["Lhurgoyf"],
            "power": "*", "toughness": "1+*", "text": "..."
        }}}"#;
        let file: CardFile = serde_json::from_str(raw).unwrap();
        let db = CardDatabase { cards: file.data };
        let text = db.format_card("Tarmogoyf");
        assert!(text.contains("Type: Creature - Lhurgoyf"));
        assert!(text.contains("Stats: */1+*"));
    }

    #[test]
    fn test_unknown_card_renders_name() {
        let db = CardDatabase::new();
        assert_eq!(db.format_card("Cat Token"), "Name: Cat Token");
    }
}
