//! Card decks.
//!
//! A session picks one [`DeckKind`] at creation time. The deck it names is a
//! fixed, ordered list of [`Card`]s: order matters, because the min/max
//! statistics rank votes by a card's position in its deck.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::CardId;

/// Which deck a session estimates with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "kebab-case", from = "String")]
#[strum(ascii_case_insensitive)]
pub enum DeckKind {
    /// Durations in hours and days.
    #[strum(serialize = "time")]
    Time,
    /// Classic Fibonacci sequence.
    #[strum(serialize = "fibonacci")]
    Fibonacci,
    /// Rounded Fibonacci with a half-point card.
    #[default]
    #[strum(serialize = "modified-fibonacci", serialize = "modifiedfibonacci")]
    ModifiedFibonacci,
}

impl DeckKind {
    /// Parse a deck name, treating anything unrecognized as modified Fibonacci.
    ///
    /// Sessions created by older servers carry free-form deck names; they all
    /// rendered the modified Fibonacci deck.
    pub fn from_name_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeckKind::Time => "time",
            DeckKind::Fibonacci => "fibonacci",
            DeckKind::ModifiedFibonacci => "modified-fibonacci",
        }
    }

    /// The full ordered deck for this kind.
    pub fn cards(&self) -> Vec<Card> {
        let table: &[(&str, &str, Option<&str>, CardColor)] = match self {
            DeckKind::Time => &[
                ("1h", "1", Some("h"), CardColor::Green),
                ("2h", "2", Some("h"), CardColor::Green),
                ("4h", "4", Some("h"), CardColor::Blue),
                ("1d", "1", Some("d"), CardColor::Blue),
                ("2d", "2", Some("d"), CardColor::Yellow),
                ("3d", "3", Some("d"), CardColor::Yellow),
                ("5d", "5", Some("d"), CardColor::Orange),
                ("10d", "10", Some("d"), CardColor::Red),
                ("?", "?", None, CardColor::Grey),
            ],
            DeckKind::Fibonacci => &[
                ("0", "0", None, CardColor::Green),
                ("1", "1", None, CardColor::Green),
                ("2", "2", None, CardColor::Green),
                ("3", "3", None, CardColor::Blue),
                ("5", "5", None, CardColor::Blue),
                ("8", "8", None, CardColor::Yellow),
                ("13", "13", None, CardColor::Yellow),
                ("21", "21", None, CardColor::Orange),
                ("34", "34", None, CardColor::Orange),
                ("55", "55", None, CardColor::Red),
                ("89", "89", None, CardColor::Red),
                ("?", "?", None, CardColor::Grey),
            ],
            DeckKind::ModifiedFibonacci => &[
                ("0", "0", None, CardColor::Green),
                ("0.5", "½", None, CardColor::Green),
                ("1", "1", None, CardColor::Green),
                ("2", "2", None, CardColor::Blue),
                ("3", "3", None, CardColor::Blue),
                ("5", "5", None, CardColor::Yellow),
                ("8", "8", None, CardColor::Yellow),
                ("13", "13", None, CardColor::Orange),
                ("20", "20", None, CardColor::Orange),
                ("40", "40", None, CardColor::Red),
                ("100", "100", None, CardColor::Red),
                ("?", "?", None, CardColor::Grey),
            ],
        };
        table.iter()
            .map(|(id, value, unit, color)| Card {
                id: CardId::from(*id),
                value: (*value).to_string(),
                unit: unit.map(str::to_string),
                color: *color,
            })
            .collect()
    }
}

/// Wire names are read leniently.
impl From<String> for DeckKind {
    fn from(name: String) -> Self {
        Self::from_name_lenient(&name)
    }
}

impl std::fmt::Display for DeckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Color tag rendered behind a revealed vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum CardColor {
    Green,
    Blue,
    Yellow,
    Orange,
    Red,
    #[strum(serialize = "grey", serialize = "gray")]
    Grey,
}

impl std::fmt::Display for CardColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CardColor::Green => "green",
            CardColor::Blue => "blue",
            CardColor::Yellow => "yellow",
            CardColor::Orange => "orange",
            CardColor::Red => "red",
            CardColor::Grey => "grey",
        };
        f.write_str(s)
    }
}

/// One card of a deck. Immutable once the deck is loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    /// Face value, e.g. `"13"` or `"½"`.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub color: CardColor,
}

impl Card {
    /// Display form: the face value, followed by the unit when there is one.
    pub fn label(&self) -> String {
        match &self.unit {
            Some(unit) => format!("{} {}", self.value, unit),
            None => self.value.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
