//! Runtime configuration, read from environment variables once at startup.

use std::path::PathBuf;

/// Engine behaviour switches.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Promote a fresh match straight to `pending_approval`.
    pub auto_submit_for_review: bool,
    /// Cap on listing endpoints.
    pub list_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_submit_for_review: false,
            list_limit: 100,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl EngineConfig {
    /// `AUTO_REVIEW=true|1`, `LIST_LIMIT=<n>`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_submit_for_review: env_flag("AUTO_REVIEW"),
            list_limit: std::env::var("LIST_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.list_limit),
        }
    }
}

/// Process-level settings for the HTTP binary.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Snapshot file; loaded on start and rewritten after each mutation.
    pub state_file: Option<PathBuf>,
    /// `username:role,...` seeded into the in-memory directory.
    pub users: String,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// `PORT` (default 8080), `STATE_FILE`, `USERS`, plus [`EngineConfig::from_env`].
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            state_file: std::env::var("STATE_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            users: std::env::var("USERS").unwrap_or_default(),
            engine: EngineConfig::from_env(),
        }
    }
}
