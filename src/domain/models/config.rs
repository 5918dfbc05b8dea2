use serde::{Deserialize, Serialize};

use super::balance::DomainDependencyMatrix;

/// Main configuration structure for stratagem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Drift detection tunables
    #[serde(default)]
    pub drift: DriftConfig,

    /// Domain balance tunables
    #[serde(default)]
    pub balance: BalanceConfig,

    /// Adjustment engine tunables
    #[serde(default)]
    pub adjustment: AdjustmentConfig,

    /// Refinement loop tunables
    #[serde(default)]
    pub refinement: RefinementConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".stratagem/stratagem.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Drift detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DriftConfig {
    /// Observation look-back window in days
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Minimum observations per (domain, metric) before drift is assessed
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Absolute drift percentage above which a signal is emitted
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,

    /// Observations assumed to remain when interpolating the expected value
    #[serde(default = "default_assumed_remaining")]
    pub assumed_remaining_observations: usize,

    /// Number of recommended actions kept in a drift report
    #[serde(default = "default_max_recommended_actions")]
    pub max_recommended_actions: usize,

    /// Emit ACCELERATED signals for nodes running well ahead of schedule
    #[serde(default)]
    pub detect_acceleration: bool,

    /// Progress lead over elapsed schedule, in percentage points, that counts as accelerated
    #[serde(default = "default_acceleration_margin")]
    pub acceleration_margin_percent: f64,
}

const fn default_lookback_days() -> u32 {
    14
}

const fn default_min_samples() -> usize {
    3
}

const fn default_threshold_percent() -> f64 {
    10.0
}

const fn default_assumed_remaining() -> usize {
    5
}

const fn default_max_recommended_actions() -> usize {
    5
}

const fn default_acceleration_margin() -> f64 {
    30.0
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            min_samples: default_min_samples(),
            threshold_percent: default_threshold_percent(),
            assumed_remaining_observations: default_assumed_remaining(),
            max_recommended_actions: default_max_recommended_actions(),
            detect_acceleration: false,
            acceleration_margin_percent: default_acceleration_margin(),
        }
    }
}

/// Domain balance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BalanceConfig {
    /// Largest absolute recommended shift tolerated before rebalancing is advised
    #[serde(default = "default_rebalance_shift_threshold")]
    pub rebalance_shift_threshold: f64,
    /// Performance records averaged into per-domain performance scores
    #[serde(default = "default_performance_window")]
    pub performance_window: usize,

    /// Signed domain dependency matrix used for conflict inference
    #[serde(default)]
    pub dependencies: DomainDependencyMatrix,
}

const fn default_rebalance_shift_threshold() -> f64 {
    15.0
}

const fn default_performance_window() -> usize {
    50
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            rebalance_shift_threshold: default_rebalance_shift_threshold(),
            performance_window: default_performance_window(),
            dependencies: DomainDependencyMatrix::default(),
        }
    }
}

/// Adjustment engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdjustmentConfig {
    /// Performance records examined for historical signals
    #[serde(default = "default_historical_window")]
    pub historical_window: usize,

    /// Relative change between oldest and newest records that counts as a trend
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold_percent: f64,

    /// Achievement percent at or above which an outcome is on track
    #[serde(default = "default_success_threshold")]
    pub success_threshold_percent: f64,
}

const fn default_historical_window() -> usize {
    20
}

const fn default_trend_threshold() -> f64 {
    10.0
}

const fn default_success_threshold() -> f64 {
    80.0
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            historical_window: default_historical_window(),
            trend_threshold_percent: default_trend_threshold(),
            success_threshold_percent: default_success_threshold(),
        }
    }
}

/// Refinement loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RefinementConfig {
    /// Days after which the last cycle is considered stale
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    /// Upper bound on recommendations attached to a cycle
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    /// Default for auto-applying adjustments to LOW auto-correctable drift
    #[serde(default)]
    pub auto_apply_low_severity: bool,

    /// Total time spent retrying a contended sequence number allocation
    #[serde(default = "default_sequence_retry_ms")]
    pub sequence_retry_max_elapsed_ms: u64,
}

const fn default_stale_after_days() -> i64 {
    7
}

const fn default_max_recommendations() -> usize {
    10
}

const fn default_sequence_retry_ms() -> u64 {
    2000
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            stale_after_days: default_stale_after_days(),
            max_recommendations: default_max_recommendations(),
            auto_apply_low_severity: false,
            sequence_retry_max_elapsed_ms: default_sequence_retry_ms(),
        }
    }
}
