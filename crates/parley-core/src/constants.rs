//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// Timeout configurations
pub mod timeouts {
    use super::*;

    /// Hard limit on waiting for a dispatched command to exit
    pub const COMMAND: Duration = Duration::from_secs(30);

    /// Limit on a single grounded reasoning call (including retries)
    pub const REASONING: Duration = Duration::from_secs(60);

    /// Connection timeout for HTTP requests
    pub const HTTP_CONNECT: Duration = Duration::from_secs(30);
}

/// Intent classification thresholds
pub mod classification {
    /// Messages shorter than this (in chars) are treated as small talk
    pub const CHITCHAT_MAX_CHARS: usize = 5;
}

/// Exit codes reported by the command bridge and local runtime
pub mod exit_codes {
    /// Reported when no exit event arrived before the deadline
    pub const TIMED_OUT: i32 = -1;
    /// Command is not on the runtime allow-list
    pub const NOT_ALLOWED: i32 = 126;
    /// Command could not be spawned
    pub const NOT_FOUND: i32 = 127;
}

/// File context limits
pub mod files {
    /// Maximum cached file contents per provider
    pub const MAX_CACHE_ENTRIES: usize = 2_000;
    /// Maximum sibling files reported as relevant context
    pub const MAX_RELEVANT_FILES: usize = 20;
}

/// Local command runtime limits
pub mod runtime {
    /// Stop forwarding output after this many bytes per command (1 MiB)
    pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;
    /// Commands the local runtime accepts by default
    pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &["npm", "node", "ls"];
}

/// AI/LLM configuration
pub mod ai {
    /// Default model ID for grounded reasoning
    pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

    /// Default maximum output tokens for a grounded answer
    pub const MAX_OUTPUT_TOKENS: usize = 2048;

    /// Messages endpoint used when no base URL is configured
    pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

    /// API version header for Anthropic
    pub const API_VERSION: &str = "2023-06-01";

    /// Environment variable holding the API key
    pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
}

/// Config and log locations
pub mod ui {
    /// Config directory name
    pub const CONFIG_DIR_NAME: &str = ".parley";

    /// Config file name inside the config directory
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Logs subdirectory name
    pub const LOGS_DIR_NAME: &str = "logs";
}
