use std::collections::HashMap;
use std::env;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the SQLite database file.
    pub db_path: String,

    /// How long suppression cache entries stay fresh.
    pub suppression_ttl_days: i64,

    /// Notion CRM credentials and routing strings. Absent when the
    /// deployment only collects locally.
    pub notion: Option<NotionConfig>,

    pub gate: GateSettings,
    pub http: HttpSettings,

    /// Per-source rate limits, keyed by source_api name. Sources without
    /// an entry fall back to each collector's default.
    pub rate_limits: HashMap<String, RateLimitSetting>,

    /// Collector names to run under `collect`/`full`. None = all registered.
    pub collectors_enabled: Option<Vec<String>>,

    /// Default lookback window when the CLI flag is absent.
    pub lookback_days: i64,

    /// Ceiling on one collector's whole run, seconds.
    pub collector_timeout_secs: u64,

    /// Run a suppression sync at orchestrator startup.
    pub warmup_sync: bool,
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: String,
    pub database_id: String,
    /// Must match the CRM's Status enum values literally, historical
    /// misspellings included.
    pub status_auto_push: String,
    pub status_needs_review: String,
    /// Statuses the fund has decided against; never overwritten.
    pub terminal_statuses: Vec<String>,
    pub schema_cache_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub high_threshold: f64,
    pub medium_threshold: f64,
    /// Require multi-source corroboration for AutoPush.
    pub strict_mode: bool,
    /// Per-signal-type base weight overrides (keyed by snake_case type name).
    pub weight_overrides: HashMap<String, f64>,
    /// Per-signal-type half-life overrides, in days.
    pub half_life_overrides: HashMap<String, f64>,
    /// Source tier multiplier overrides, keyed "1".."4".
    pub tier_overrides: HashMap<String, f64>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            high_threshold: 0.70,
            medium_threshold: 0.40,
            strict_mode: false,
            weight_overrides: HashMap::new(),
            half_life_overrides: HashMap::new(),
            tier_overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSetting {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl Config {
    /// Load configuration from environment variables. Anything malformed
    /// is a configuration error (CLI exit code 2), not a panic.
    pub fn from_env() -> Result<Self> {
        let notion = match env::var("NOTION_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => Some(NotionConfig {
                api_key,
                database_id: required_env("NOTION_DATABASE_ID")?,
                status_auto_push: env::var("NOTION_STATUS_AUTO_PUSH")
                    .unwrap_or_else(|_| "Source".to_string()),
                status_needs_review: env::var("NOTION_STATUS_NEEDS_REVIEW")
                    .unwrap_or_else(|_| "Review".to_string()),
                terminal_statuses: csv_env("NOTION_TERMINAL_STATUSES")
                    .unwrap_or_else(|| vec!["Passed".to_string(), "Lost".to_string()]),
                schema_cache_ttl_hours: parsed_env("SCHEMA_CACHE_TTL_HOURS", 6)?,
            }),
            _ => None,
        };

        let gate = GateSettings {
            high_threshold: parsed_env("GATE_HIGH_THRESHOLD", 0.70)?,
            medium_threshold: parsed_env("GATE_MEDIUM_THRESHOLD", 0.40)?,
            strict_mode: parsed_env("GATE_STRICT_MODE", false)?,
            weight_overrides: json_map_env("GATE_WEIGHTS_JSON")?,
            half_life_overrides: json_map_env("GATE_HALF_LIVES_JSON")?,
            tier_overrides: json_map_env("GATE_TIER_MULTIPLIERS_JSON")?,
        };

        let http = HttpSettings {
            retries: parsed_env("HTTP_RETRIES", 3)?,
            backoff_base_ms: parsed_env("HTTP_BACKOFF_BASE_MS", 500)?,
            backoff_max_ms: parsed_env("HTTP_BACKOFF_MAX_MS", 30_000)?,
            timeout_secs: parsed_env("HTTP_TIMEOUT_SECS", 10)?,
        };

        Ok(Self {
            db_path: env::var("DEALSIGNAL_DB_PATH")
                .unwrap_or_else(|_| "dealsignal.db".to_string()),
            suppression_ttl_days: parsed_env("SUPPRESSION_TTL_DAYS", 7)?,
            notion,
            gate,
            http,
            rate_limits: rate_limits_from_env()?,
            collectors_enabled: csv_env("COLLECTORS_ENABLED"),
            lookback_days: parsed_env("LOOKBACK_DAYS", 7)?,
            collector_timeout_secs: parsed_env("COLLECTOR_TIMEOUT_SECS", 300)?,
            warmup_sync: parsed_env("WARMUP_SYNC", false)?,
        })
    }

    /// The Notion config, or a configuration error for CRM-touching jobs.
    pub fn notion(&self) -> Result<&NotionConfig> {
        self.notion
            .as_ref()
            .context("NOTION_API_KEY / NOTION_DATABASE_ID are required for this command")
    }

    /// Log credential presence without exposing values.
    pub fn log_redacted(&self) {
        match &self.notion {
            Some(n) => {
                tracing::info!("NOTION_API_KEY = ({} chars)", n.api_key.len());
                tracing::info!("NOTION_DATABASE_ID = ({} chars)", n.database_id.len());
            }
            None => tracing::info!("NOTION_API_KEY = (unset, CRM jobs disabled)"),
        }
        tracing::info!(db_path = %self.db_path, "store");
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => Ok(v),
            Err(e) => bail!("{key} is malformed: {e}"),
        },
        Err(_) => Ok(default),
    }
}

fn csv_env(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn json_map_env(key: &str) -> Result<HashMap<String, f64>> {
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => {
            serde_json::from_str(&raw).with_context(|| format!("{key} is not a JSON object of numbers"))
        }
        _ => Ok(HashMap::new()),
    }
}

/// Scan `RATE_LIMIT_<SOURCE>` env vars. Value is `rps` or `rps:burst`.
fn rate_limits_from_env() -> Result<HashMap<String, RateLimitSetting>> {
    let mut limits = HashMap::new();
    for (key, value) in env::vars() {
        let Some(source) = key.strip_prefix("RATE_LIMIT_") else {
            continue;
        };
        let (rps_raw, burst_raw) = match value.split_once(':') {
            Some((r, b)) => (r, Some(b)),
            None => (value.as_str(), None),
        };
        let requests_per_second: f64 = rps_raw
            .trim()
            .parse()
            .with_context(|| format!("{key} requests/sec is malformed"))?;
        let burst: u32 = match burst_raw {
            Some(b) => b
                .trim()
                .parse()
                .with_context(|| format!("{key} burst is malformed"))?,
            None => requests_per_second.ceil().max(1.0) as u32,
        };
        limits.insert(source.to_lowercase(), RateLimitSetting { requests_per_second, burst });
    }
    Ok(limits)
}
