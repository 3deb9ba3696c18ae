//! Runtime settings, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Policy for choosing between consolidated and platform-specific tables
/// when a request spans multiple platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableResolution {
    /// Multi-platform requests use the consolidated table when one exists;
    /// single-platform requests use the platform table. Default.
    PreferConsolidated,
    /// Always use the platform table of the first requested platform.
    PreferPlatform,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the schema document tree (one subdirectory per platform
    /// plus `consolidated/`).
    pub schema_dir: PathBuf,
    /// Fallback window, in days, when no time phrase is recognized.
    pub default_window_days: u32,
    pub table_resolution: TableResolution,
    pub warehouse_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub memory_max_messages: usize,
    pub memory_max_age: Duration,
    pub memory_snapshot_path: Option<PathBuf>,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    /// When false, data-query replies use the deterministic template
    /// formatter instead of an LLM summarization call.
    pub llm_summaries: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_dir: PathBuf::from("schemas"),
            default_window_days: 30,
            table_resolution: TableResolution::PreferConsolidated,
            warehouse_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            memory_max_messages: 10,
            memory_max_age: Duration::from_secs(24 * 3600),
            memory_snapshot_path: None,
            llm_api_key: String::new(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4".to_string(),
            llm_summaries: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let mut s = Settings::default();
        if let Ok(v) = std::env::var("SCHEMA_DIR") {
            s.schema_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse("DEFAULT_WINDOW_DAYS") {
            s.default_window_days = v;
        }
        if let Ok(v) = std::env::var("TABLE_RESOLUTION") {
            if v.eq_ignore_ascii_case("platform") {
                s.table_resolution = TableResolution::PreferPlatform;
            }
        }
        if let Some(v) = env_parse("WAREHOUSE_TIMEOUT_SECS") {
            s.warehouse_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("MAX_RETRIES") {
            s.max_retries = v;
        }
        if let Some(v) = env_parse("RETRY_BACKOFF_MS") {
            s.retry_backoff = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("MEMORY_MAX_MESSAGES") {
            s.memory_max_messages = v;
        }
        if let Some(v) = env_parse::<u64>("MEMORY_MAX_AGE_HOURS") {
            s.memory_max_age = Duration::from_secs(v * 3600);
        }
        if let Ok(v) = std::env::var("MEMORY_SNAPSHOT_PATH") {
            s.memory_snapshot_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            s.llm_api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            s.llm_base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            s.llm_model = v;
        }
        if let Ok(v) = std::env::var("LLM_SUMMARIES") {
            s.llm_summaries = v == "1" || v.eq_ignore_ascii_case("true");
        }
        s
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// User-facing message strings. Internal detail never leaks into these.
pub mod messages {
    pub const GENERIC_FAILURE: &str =
        "Sorry, I couldn't answer that question. Please try rephrasing it.";
    pub const TRY_AGAIN_LATER: &str =
        "The data warehouse is taking too long to respond. Please try again later.";
    pub const NO_DATA: &str = "I found no data matching your query.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.default_window_days, 30);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.table_resolution, TableResolution::PreferConsolidated);
    }
}
