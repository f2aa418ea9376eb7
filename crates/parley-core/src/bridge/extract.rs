//! Command extraction from free text
//!
//! Rules are tried in order; the first one that yields a command wins.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// A command and its arguments, ready to hand to the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCommand {
    pub command: String,
    pub args: Vec<String>,
}

impl ExtractedCommand {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl std::fmt::Display for ExtractedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.command)
        } else {
            write!(f, "{} {}", self.command, shell_words::join(&self.args))
        }
    }
}

/// Pattern: inline code span - "run `cargo check --all`"
static RE_BACKTICK: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());

/// Pattern: npm scripts - "npm test", "npm run build", "npm install"
static RE_NPM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bnpm\s+(test|start|install|ci|run\s+[\w:.-]+)\b").unwrap()
});

/// Pattern: node with a script argument - "node server.js"
static RE_NODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bnode\s+([\w./-]+)").unwrap());

/// Pattern: directory listing with optional flags - "ls", "ls -la"
static RE_LS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bls\b(?:\s+(-[a-z]+))?").unwrap());

struct ExtractionRule {
    name: &'static str,
    pattern: &'static Lazy<Regex>,
    build: fn(&Captures<'_>) -> Option<ExtractedCommand>,
}

static RULES: &[ExtractionRule] = &[
    ExtractionRule {
        name: "inline_code",
        pattern: &RE_BACKTICK,
        build: from_inline_code,
    },
    ExtractionRule {
        name: "npm",
        pattern: &RE_NPM,
        build: from_npm,
    },
    ExtractionRule {
        name: "node",
        pattern: &RE_NODE,
        build: from_node,
    },
    ExtractionRule {
        name: "ls",
        pattern: &RE_LS,
        build: from_ls,
    },
];

fn from_inline_code(caps: &Captures<'_>) -> Option<ExtractedCommand> {
    let mut words = shell_words::split(caps.get(1)?.as_str()).ok()?.into_iter();
    let command = words.next()?;
    Some(ExtractedCommand::new(command, words.collect()))
}

fn from_npm(caps: &Captures<'_>) -> Option<ExtractedCommand> {
    let args = caps
        .get(1)?
        .as_str()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    Some(ExtractedCommand::new("npm", args))
}

fn from_node(caps: &Captures<'_>) -> Option<ExtractedCommand> {
    Some(ExtractedCommand::new(
        "node",
        vec![caps.get(1)?.as_str().to_string()],
    ))
}

fn from_ls(caps: &Captures<'_>) -> Option<ExtractedCommand> {
    let args = caps
        .get(1)
        .map(|flags| vec![flags.as_str().to_string()])
        .unwrap_or_default();
    Some(ExtractedCommand::new("ls", args))
}

/// Pull a runnable command out of the user's text, if there is one
pub fn extract_command(text: &str) -> Option<ExtractedCommand> {
    RULES.iter().find_map(|rule| {
        let caps = rule.pattern.captures(text)?;
        let command = (rule.build)(&caps)?;
        tracing::debug!(rule = rule.name, command = %command, "Extracted command");
        Some(command)
    })
}
