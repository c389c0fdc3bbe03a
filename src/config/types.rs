use crate::model::{CollectionSettings, Target};
use crate::ConfigResult;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Group-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub tab: TabConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
    #[serde(rename = "target", default)]
    pub targets: Vec<TargetEntry>,
}

impl Config {
    /// Resolves the configured target entries into a processing queue
    ///
    /// Entries without an explicit `id` derive it from the `/groups/<id>` path.
    pub fn targets(&self) -> ConfigResult<Vec<Target>> {
        self.targets
            .iter()
            .map(|entry| entry.to_target().map_err(Into::into))
            .collect()
    }

    /// Settings for a run started from this configuration
    pub fn settings(&self) -> CollectionSettings {
        CollectionSettings {
            items_per_target: self.collection.items_per_target,
            include_secondary: self.collection.include_secondary,
            use_simulated_data: self.collection.use_simulated_data,
        }
    }
}

/// What each visit collects
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    /// Maximum number of posts extracted per target
    #[serde(rename = "items-per-target", default = "default_items_per_target")]
    pub items_per_target: u32,

    /// Whether comments are collected alongside posts
    #[serde(rename = "include-secondary", default = "default_true")]
    pub include_secondary: bool,

    /// Synthesize records instead of opening tabs
    #[serde(rename = "use-simulated-data", default)]
    pub use_simulated_data: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            items_per_target: default_items_per_target(),
            include_secondary: true,
            use_simulated_data: false,
        }
    }
}

/// Pacing between visits
///
/// Every `cooldown-every`-th visit waits for the long cooldown range; all other
/// visits wait for the short jitter range. `cooldown-every = 0` disables cooldowns.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(rename = "cooldown-every", default = "default_cooldown_every")]
    pub cooldown_every: u32,

    #[serde(rename = "short-delay-min-ms", default = "default_short_delay_min_ms")]
    pub short_delay_min_ms: u64,

    #[serde(rename = "short-delay-max-ms", default = "default_short_delay_max_ms")]
    pub short_delay_max_ms: u64,

    #[serde(rename = "cooldown-min-ms", default = "default_cooldown_min_ms")]
    pub cooldown_min_ms: u64,

    #[serde(rename = "cooldown-max-ms", default = "default_cooldown_max_ms")]
    pub cooldown_max_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown_every: default_cooldown_every(),
            short_delay_min_ms: default_short_delay_min_ms(),
            short_delay_max_ms: default_short_delay_max_ms(),
            cooldown_min_ms: default_cooldown_min_ms(),
            cooldown_max_ms: default_cooldown_max_ms(),
        }
    }
}

/// Tab lifecycle timing
#[derive(Debug, Clone, Deserialize)]
pub struct TabConfig {
    /// How long to wait for the load-complete signal (milliseconds)
    #[serde(rename = "load-timeout-ms", default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Extra wait after load for client-rendered content (milliseconds)
    #[serde(rename = "settle-delay-ms", default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Caller-side timeout for one extraction round-trip (milliseconds)
    #[serde(rename = "extraction-timeout-ms", default = "default_extraction_timeout_ms")]
    pub extraction_timeout_ms: u64,
}

impl TabConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: default_load_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            extraction_timeout_ms: default_extraction_timeout_ms(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the collector
    #[serde(rename = "name")]
    pub name: String,

    /// Version of the collector
    #[serde(rename = "version")]
    pub version: String,

    /// URL with information about the collector
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for collector-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: Name/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.name, self.version, self.contact_url, self.contact_email
        )
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Number of log entries kept in the persisted ring
    #[serde(rename = "log-capacity", default = "default_log_capacity")]
    pub log_capacity: usize,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path the CSV export is written to
    #[serde(rename = "csv-path")]
    pub csv_path: String,
}

/// A group to visit
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    pub url: String,

    /// Group id; derived from the URL when absent
    #[serde(default)]
    pub id: Option<String>,

    /// Display name; defaults to the id
    #[serde(default)]
    pub name: Option<String>,
}

impl TargetEntry {
    pub fn to_target(&self) -> crate::ModelResult<Target> {
        let mut target = Target::from_group_url(&self.url, self.name.as_deref())
            .or_else(|err| match (&self.id, err) {
                (Some(id), crate::ModelError::MissingGroupId(_)) => {
                    let name = self.name.clone().unwrap_or_else(|| id.clone());
                    let target = Target::new(id.clone(), name, self.url.trim());
                    target.parsed_url()?;
                    Ok(target)
                }
                (_, err) => Err(err),
            })?;

        if let Some(id) = self.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            if self.name.is_none() {
                target.name = id.to_string();
            }
            target.id = id.to_string();
        }

        Ok(target)
    }
}

fn default_items_per_target() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_cooldown_every() -> u32 {
    2
}

fn default_short_delay_min_ms() -> u64 {
    2_000
}

fn default_short_delay_max_ms() -> u64 {
    15_000
}

fn default_cooldown_min_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_cooldown_max_ms() -> u64 {
    10 * 60 * 1_000
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_settle_delay_ms() -> u64 {
    3_000
}

fn default_extraction_timeout_ms() -> u64 {
    60_000
}

fn default_log_capacity() -> usize {
    crate::logging::DEFAULT_LOG_CAPACITY
}
