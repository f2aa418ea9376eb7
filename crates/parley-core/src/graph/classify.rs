//! Intent classification
//!
//! An ordered rule table; the first predicate that matches decides.
//! Matching is case-insensitive substring search on the message text.

use serde::{Deserialize, Serialize};

use super::state::UserIntent;
use crate::constants::classification::CHITCHAT_MAX_CHARS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    CodeQuery,
    Command,
    Chitchat,
    Ambiguous,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::CodeQuery => "code_query",
            Classification::Command => "command",
            Classification::Chitchat => "chitchat",
            Classification::Ambiguous => "ambiguous",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Rule {
    name: &'static str,
    matches: fn(&str) -> bool,
    outcome: Classification,
}

const COMMAND_KEYWORDS: &[&str] = &["run", "exec", "test"];
const GREETING_KEYWORDS: &[&str] = &["hello", "hi "];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn has_command_keyword(text: &str) -> bool {
    contains_any(text, COMMAND_KEYWORDS)
}

fn has_greeting(text: &str) -> bool {
    contains_any(text, GREETING_KEYWORDS)
}

fn is_too_short(text: &str) -> bool {
    text.chars().count() < CHITCHAT_MAX_CHARS
}

fn always(_text: &str) -> bool {
    true
}

/// Rules for text-bearing intents; the text is already lowercased
static RULES: &[Rule] = &[
    Rule {
        name: "command_keyword",
        matches: has_command_keyword,
        outcome: Classification::Command,
    },
    Rule {
        name: "greeting",
        matches: has_greeting,
        outcome: Classification::Chitchat,
    },
    Rule {
        name: "too_short",
        matches: is_too_short,
        outcome: Classification::Chitchat,
    },
    Rule {
        name: "default",
        matches: always,
        outcome: Classification::CodeQuery,
    },
];

/// Classify a typed message
pub fn classify_text(text: &str) -> Classification {
    let lowered = text.to_lowercase();
    RULES
        .iter()
        .find(|rule| (rule.matches)(&lowered))
        .map(|rule| {
            tracing::debug!(rule = rule.name, classification = %rule.outcome, "Classified");
            rule.outcome
        })
        .unwrap_or(Classification::CodeQuery)
}

/// Classify an intent; only typed messages carry classifiable text
pub fn classify(intent: &UserIntent) -> Classification {
    match intent.text() {
        Some(text) => classify_text(text),
        None => Classification::Ambiguous,
    }
}
