use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub weighting: WeightingConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection to the native indexing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_core_url")]
    pub url: String,
    #[serde(default = "default_core_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub chunk_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_dedupe_by_file")]
    pub dedupe_by_file: bool,
    #[serde(default = "default_min_results")]
    pub min_results: usize,
    #[serde(default = "default_score_gap_ratio")]
    pub score_gap_ratio: f64,
    #[serde(default = "default_graph_only_penalty")]
    pub graph_only_penalty: f64,
    #[serde(default = "default_single_signal_penalty")]
    pub single_signal_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_backend")]
    pub backend: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_rerank_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_rerank_max_results")]
    pub max_results: usize,
    #[serde(default = "default_rerank_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides for the rule-based kind weight table, keyed by kind name.
    #[serde(default)]
    pub kind_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightingConfig {
    #[serde(default = "default_weighting_backend")]
    pub backend: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_weighting_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "default_expansion_backend")]
    pub backend: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_expansion_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_expansion_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_expansion_max_terms")]
    pub max_terms: usize,
}

/// AIMD tuning for the embedding scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default = "default_aimd_window")]
    pub window: usize,
    #[serde(default = "default_aimd_increase_above")]
    pub increase_above: f64,
    #[serde(default = "default_aimd_decrease_below")]
    pub decrease_below: f64,
    #[serde(default = "default_remote_initial_concurrency")]
    pub remote_initial_concurrency: usize,
    #[serde(default = "default_remote_max_concurrency")]
    pub remote_max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_core_url() -> String {
    constants::DEFAULT_CORE_URL.to_string()
}
fn default_core_timeout_ms() -> u64 {
    30_000
}
fn default_limit() -> usize {
    constants::DEFAULT_LIMIT
}
fn default_dedupe_by_file() -> bool {
    true
}
fn default_min_results() -> usize {
    constants::DEFAULT_MIN_RESULTS
}
fn default_score_gap_ratio() -> f64 {
    constants::DEFAULT_SCORE_GAP_RATIO
}
fn default_graph_only_penalty() -> f64 {
    constants::DEFAULT_GRAPH_ONLY_PENALTY
}
fn default_single_signal_penalty() -> f64 {
    constants::DEFAULT_SINGLE_SIGNAL_PENALTY
}
fn default_rerank_backend() -> String {
    "none".to_string()
}
fn default_rerank_pool_size() -> usize {
    constants::DEFAULT_RERANK_POOL_SIZE
}
fn default_rerank_max_results() -> usize {
    100
}
fn default_rerank_timeout_ms() -> u64 {
    30_000
}
fn default_embedding_backend() -> String {
    "none".to_string()
}
fn default_embedding_batch_size() -> usize {
    32
}
fn default_embedding_timeout_ms() -> u64 {
    30_000
}
fn default_weighting_backend() -> String {
    "rule_based".to_string()
}
fn default_weighting_timeout_ms() -> u64 {
    10_000
}
fn default_expansion_backend() -> String {
    "none".to_string()
}
fn default_expansion_timeout_ms() -> u64 {
    15_000
}
fn default_expansion_max_tokens() -> u32 {
    80
}
fn default_expansion_max_terms() -> usize {
    30
}
fn default_aimd_window() -> usize {
    constants::AIMD_WINDOW
}
fn default_aimd_increase_above() -> f64 {
    constants::AIMD_INCREASE_ABOVE
}
fn default_aimd_decrease_below() -> f64 {
    constants::AIMD_DECREASE_BELOW
}
fn default_remote_initial_concurrency() -> usize {
    2
}
fn default_remote_max_concurrency() -> usize {
    8
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            url: default_core_url(),
            timeout_ms: default_core_timeout_ms(),
            chunk_enabled: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            dedupe_by_file: default_dedupe_by_file(),
            min_results: default_min_results(),
            score_gap_ratio: default_score_gap_ratio(),
            graph_only_penalty: default_graph_only_penalty(),
            single_signal_penalty: default_single_signal_penalty(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            backend: default_rerank_backend(),
            model: None,
            base_url: None,
            api_key_env: None,
            pool_size: default_rerank_pool_size(),
            max_results: default_rerank_max_results(),
            timeout_ms: default_rerank_timeout_ms(),
            kind_weights: BTreeMap::new(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: None,
            dimensions: None,
            base_url: None,
            api_key_env: None,
            batch_size: default_embedding_batch_size(),
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            backend: default_weighting_backend(),
            model: None,
            base_url: None,
            api_key_env: None,
            timeout_ms: default_weighting_timeout_ms(),
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            backend: default_expansion_backend(),
            model: None,
            base_url: None,
            api_key_env: None,
            timeout_ms: default_expansion_timeout_ms(),
            max_tokens: default_expansion_max_tokens(),
            max_terms: default_expansion_max_terms(),
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            window: default_aimd_window(),
            increase_above: default_aimd_increase_above(),
            decrease_below: default_aimd_decrease_below(),
            remote_initial_concurrency: default_remote_initial_concurrency(),
            remote_max_concurrency: default_remote_max_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

const RERANK_BACKENDS: &[&str] = &[
    "none",
    "rule_based",
    "cross_encoder",
    "cohere",
    "openai",
    "siliconflow",
    "api",
];
const EMBEDDING_BACKENDS: &[&str] = &["none", "local", "openai", "voyage", "siliconflow"];
const WEIGHTING_BACKENDS: &[&str] = &["none", "rule_based", "siliconflow", "openai"];
const EXPANSION_BACKENDS: &[&str] = &["none", "siliconflow", "openai"];
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Load configuration with layered precedence (highest last):
    /// built-in defaults, `~/.scry/config.toml`, `<repo_root>/.scry/config.toml`,
    /// then `SCRY_<SECTION>_<KEY>` environment variables.
    pub fn load(repo_root: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_file(repo_root, None)
    }

    /// Same as [`Config::load`] with an explicit file layered above the project config.
    pub fn load_with_file(
        repo_root: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(home) = dirs::home_dir() {
            let global_path = home.join(constants::DEFAULT_DATA_DIR).join("config.toml");
            if global_path.exists() {
                let raw = load_toml_value(&global_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(root) = repo_root {
            let project_path = root.join(constants::PROJECT_CONFIG_FILE);
            if project_path.exists() {
                let raw = load_toml_value(&project_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(cf) = config_file {
            if !cf.exists() {
                return Err(ConfigError::NotFound {
                    path: cf.display().to_string(),
                });
            }
            let raw = load_toml_value(cf)?;
            merge_toml_values(&mut merged, &raw);
        }

        let config_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        self.rerank.backend = normalize_choice(
            &self.rerank.backend,
            RERANK_BACKENDS,
            &default_rerank_backend(),
            "rerank.backend",
        );
        self.embedding.backend = normalize_choice(
            &self.embedding.backend,
            EMBEDDING_BACKENDS,
            &default_embedding_backend(),
            "embedding.backend",
        );
        self.weighting.backend = normalize_choice(
            &self.weighting.backend,
            WEIGHTING_BACKENDS,
            &default_weighting_backend(),
            "weighting.backend",
        );
        self.expansion.backend = normalize_choice(
            &self.expansion.backend,
            EXPANSION_BACKENDS,
            &default_expansion_backend(),
            "expansion.backend",
        );
        self.logging.level = normalize_choice(
            &self.logging.level,
            LOG_LEVELS,
            &default_log_level(),
            "logging.level",
        );
        self.logging.format = normalize_choice(
            &self.logging.format,
            LOG_FORMATS,
            &default_log_format(),
            "logging.format",
        );

        self.search.default_limit = clamp_min_usize_with_warning(
            self.search.default_limit,
            1,
            default_limit(),
            "search.default_limit",
        );
        self.search.min_results = clamp_min_usize_with_warning(
            self.search.min_results,
            1,
            default_min_results(),
            "search.min_results",
        );
        self.search.score_gap_ratio = clamp_unit_f64_with_warning(
            self.search.score_gap_ratio,
            default_score_gap_ratio(),
            "search.score_gap_ratio",
        );
        self.search.graph_only_penalty = clamp_non_negative_f64_with_warning(
            self.search.graph_only_penalty,
            default_graph_only_penalty(),
            "search.graph_only_penalty",
        );
        self.search.single_signal_penalty = clamp_non_negative_f64_with_warning(
            self.search.single_signal_penalty,
            default_single_signal_penalty(),
            "search.single_signal_penalty",
        );

        self.rerank.pool_size = clamp_min_usize_with_warning(
            self.rerank.pool_size,
            1,
            default_rerank_pool_size(),
            "rerank.pool_size",
        );
        if self.rerank.pool_size > constants::MAX_POOL_SIZE {
            tracing::warn!(
                field = "rerank.pool_size",
                value = self.rerank.pool_size,
                max = constants::MAX_POOL_SIZE,
                "config value exceeds core pool bound; capped"
            );
            self.rerank.pool_size = constants::MAX_POOL_SIZE;
        }
        self.rerank.max_results = clamp_min_usize_with_warning(
            self.rerank.max_results,
            1,
            default_rerank_max_results(),
            "rerank.max_results",
        );
        for (kind, weight) in self.rerank.kind_weights.iter_mut() {
            let field = format!("rerank.kind_weights.{kind}");
            *weight = clamp_non_negative_f64_with_warning(*weight, 0.0, &field);
        }

        self.embedding.batch_size = clamp_min_usize_with_warning(
            self.embedding.batch_size,
            1,
            default_embedding_batch_size(),
            "embedding.batch_size",
        );
        self.expansion.max_terms = clamp_min_usize_with_warning(
            self.expansion.max_terms,
            1,
            default_expansion_max_terms(),
            "expansion.max_terms",
        );

        self.adaptive.window = clamp_min_usize_with_warning(
            self.adaptive.window,
            1,
            default_aimd_window(),
            "adaptive.window",
        );
        self.adaptive.increase_above = clamp_unit_f64_with_warning(
            self.adaptive.increase_above,
            default_aimd_increase_above(),
            "adaptive.increase_above",
        );
        self.adaptive.decrease_below = clamp_unit_f64_with_warning(
            self.adaptive.decrease_below,
            default_aimd_decrease_below(),
            "adaptive.decrease_below",
        );
        if self.adaptive.decrease_below > self.adaptive.increase_above {
            tracing::warn!(
                increase_above = self.adaptive.increase_above,
                decrease_below = self.adaptive.decrease_below,
                "adaptive thresholds overlap; falling back to defaults"
            );
            self.adaptive.increase_above = default_aimd_increase_above();
            self.adaptive.decrease_below = default_aimd_decrease_below();
        }
        self.adaptive.remote_initial_concurrency = clamp_min_usize_with_warning(
            self.adaptive.remote_initial_concurrency,
            1,
            default_remote_initial_concurrency(),
            "adaptive.remote_initial_concurrency",
        );
        if self.adaptive.remote_max_concurrency < self.adaptive.remote_initial_concurrency {
            tracing::warn!(
                field = "adaptive.remote_max_concurrency",
                value = self.adaptive.remote_max_concurrency,
                min = self.adaptive.remote_initial_concurrency,
                "config value below initial concurrency; raised"
            );
            self.adaptive.remote_max_concurrency = self.adaptive.remote_initial_concurrency;
        }
    }
}

/// Load a TOML file as a raw `toml::Value` (preserving only explicitly-set fields).
fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Deep-merge `overlay` into `base`. Only keys present in `overlay` are written.
fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            match base_map.get_mut(key) {
                Some(base_val) if base_val.is_table() && overlay_val.is_table() => {
                    merge_toml_values(base_val, overlay_val);
                }
                Some(base_val) => *base_val = overlay_val.clone(),
                None => {
                    base_map.insert(key.clone(), overlay_val.clone());
                }
            }
        }
    }
}

/// Convention: `SCRY_<SECTION>_<KEY>` in UPPER_SNAKE_CASE.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("SCRY_CORE_URL") {
        config.core.url = v;
    }
    if let Ok(v) = std::env::var("SCRY_CORE_TIMEOUT_MS")
        && let Ok(n) = v.parse()
    {
        config.core.timeout_ms = n;
    }
    if let Ok(v) = std::env::var("SCRY_CORE_CHUNK_ENABLED")
        && let Some(flag) = parse_env_bool(&v)
    {
        config.core.chunk_enabled = flag;
    }
    if let Ok(v) = std::env::var("SCRY_SEARCH_DEFAULT_LIMIT")
        && let Ok(n) = v.parse()
    {
        config.search.default_limit = n;
    }
    if let Ok(v) = std::env::var("SCRY_SEARCH_DEDUPE_BY_FILE")
        && let Some(flag) = parse_env_bool(&v)
    {
        config.search.dedupe_by_file = flag;
    }
    if let Ok(v) = std::env::var("SCRY_SEARCH_MIN_RESULTS")
        && let Ok(n) = v.parse()
    {
        config.search.min_results = n;
    }
    if let Ok(v) = std::env::var("SCRY_SEARCH_SCORE_GAP_RATIO")
        && let Ok(n) = v.parse()
    {
        config.search.score_gap_ratio = n;
    }
    if let Ok(v) = std::env::var("SCRY_RERANK_BACKEND") {
        config.rerank.backend = v;
    }
    if let Ok(v) = std::env::var("SCRY_RERANK_MODEL") {
        config.rerank.model = Some(v);
    }
    if let Ok(v) = std::env::var("SCRY_RERANK_BASE_URL") {
        config.rerank.base_url = Some(v);
    }
    if let Ok(v) = std::env::var("SCRY_RERANK_POOL_SIZE")
        && let Ok(n) = v.parse()
    {
        config.rerank.pool_size = n;
    }
    if let Ok(v) = std::env::var("SCRY_EMBEDDING_BACKEND") {
        config.embedding.backend = v;
    }
    if let Ok(v) = std::env::var("SCRY_EMBEDDING_MODEL") {
        config.embedding.model = Some(v);
    }
    if let Ok(v) = std::env::var("SCRY_EMBEDDING_DIMENSIONS")
        && let Ok(n) = v.parse()
    {
        config.embedding.dimensions = Some(n);
    }
    if let Ok(v) = std::env::var("SCRY_WEIGHTING_BACKEND") {
        config.weighting.backend = v;
    }
    if let Ok(v) = std::env::var("SCRY_EXPANSION_BACKEND") {
        config.expansion.backend = v;
    }
    if let Ok(v) = std::env::var("SCRY_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Ok(v) = std::env::var("SCRY_LOG_FORMAT") {
        config.logging.format = v;
    }
}

fn parse_env_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn normalize_choice(raw: &str, allowed: &[&str], fallback: &str, field: &str) -> String {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    let normalized = match normalized.as_str() {
        "warning" => "warn".to_string(),
        "" | "off" | "disabled" if allowed.contains(&"none") => "none".to_string(),
        _ => normalized,
    };
    if allowed.contains(&normalized.as_str()) {
        return normalized;
    }
    tracing::warn!(
        field,
        value = raw,
        fallback,
        "unknown config value; falling back to default"
    );
    fallback.to_string()
}

fn clamp_unit_f64_with_warning(value: f64, fallback: f64, field: &str) -> f64 {
    if !value.is_finite() {
        tracing::warn!(
            field,
            value,
            fallback,
            "invalid non-finite config value; falling back to default"
        );
        return fallback;
    }
    let clamped = value.clamp(0.0, 1.0);
    if (clamped - value).abs() > f64::EPSILON {
        tracing::warn!(
            field,
            value,
            clamped,
            "config value out of range; clamped to [0.0, 1.0]"
        );
    }
    clamped
}

fn clamp_non_negative_f64_with_warning(value: f64, fallback: f64, field: &str) -> f64 {
    if !value.is_finite() || value < 0.0 {
        tracing::warn!(
            field,
            value,
            fallback,
            "config value must be a non-negative number; falling back to default"
        );
        return fallback;
    }
    value
}

fn clamp_min_usize_with_warning(value: usize, min: usize, fallback: usize, field: &str) -> usize {
    if value < min {
        tracing::warn!(
            field,
            value,
            min,
            fallback,
            "config value below minimum; falling back to default"
        );
        fallback
    } else {
        value
    }
}
