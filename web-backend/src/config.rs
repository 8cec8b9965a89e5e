use std::time::Duration;

/// Runtime configuration, read once at startup from `VULNWATCH_*`
/// environment variables with workable defaults for local development.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub database_path: String,
    pub ai_base_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
    /// Delay before a pending scan moves to in_progress.
    pub scan_start_delay: Duration,
    /// Delay an in_progress scan spends "assessing" before completion.
    pub scan_run_delay: Duration,
    /// Simulated report generation time.
    pub report_delay: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            bind_address: env_or("VULNWATCH_BIND", "0.0.0.0:8000"),
            database_path: env_or("VULNWATCH_DB", "vulnwatch.db"),
            ai_base_url: env_or("VULNWATCH_AI_BASE_URL", "https://api.openai.com/v1"),
            ai_api_key: env_or("VULNWATCH_AI_API_KEY", ""),
            ai_model: env_or("VULNWATCH_AI_MODEL", "gpt-4o-mini"),
            scan_start_delay: Duration::from_millis(env_ms("VULNWATCH_SCAN_START_DELAY_MS", 1000)),
            scan_run_delay: Duration::from_millis(env_ms("VULNWATCH_SCAN_RUN_DELAY_MS", 1500)),
            report_delay: Duration::from_millis(env_ms("VULNWATCH_REPORT_DELAY_MS", 2000)),
        }
    }

    /// Configuration for tests: no phase delays, no reachable AI endpoint.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            database_path: ":memory:".to_string(),
            ai_base_url: "http://127.0.0.1:1".to_string(),
            ai_api_key: "test-key".to_string(),
            ai_model: "test-model".to_string(),
            scan_start_delay: Duration::from_millis(0),
            scan_run_delay: Duration::from_millis(0),
            report_delay: Duration::from_millis(0),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_ms(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
