/// Default result limit for queries.
pub const DEFAULT_LIMIT: usize = 10;

/// Upper bound on the candidate pool the retrieval core accepts per query.
pub const MAX_POOL_SIZE: usize = 200;

/// Default rerank candidate pool.
pub const DEFAULT_RERANK_POOL_SIZE: usize = 50;

/// Pool multiplier applied to `limit` when reranking or file dedupe is active.
pub const POOL_LIMIT_MULTIPLIER: usize = 5;

/// Reciprocal-rank-fusion smoothing constant.
pub const RRF_K: f64 = 60.0;

/// Maximum graph traversal depth for function context requests.
pub const MAX_GRAPH_DEPTH: u32 = 5;

/// Maximum fan-out per node for function context requests.
pub const MAX_GRAPH_FANOUT: usize = 200;

/// Maximum number of identifiers mined from a single query.
pub const MAX_IDENTIFIERS: usize = 20;

/// Smallest number of results score-gap truncation will keep.
pub const DEFAULT_MIN_RESULTS: usize = 3;

/// Relative score drop (`cur / prev`) that marks a cut point.
pub const DEFAULT_SCORE_GAP_RATIO: f64 = 0.6;

/// Multiplier for hits whose only evidence is graph expansion.
pub const DEFAULT_GRAPH_ONLY_PENALTY: f64 = 0.7;

/// Multiplier for hits backed by exactly one signal.
pub const DEFAULT_SINGLE_SIGNAL_PENALTY: f64 = 0.85;

/// Items per embedding batch.
pub const EMBEDDING_BATCH_SIZE: usize = 100;

/// Character cap for text sent to an embedding provider.
pub const MAX_EMBEDDING_TEXT_CHARS: usize = 32_768;

/// AIMD sliding window length.
pub const AIMD_WINDOW: usize = 20;

/// AIMD success rate above which concurrency grows by one.
pub const AIMD_INCREASE_ABOVE: f64 = 0.95;

/// AIMD success rate below which concurrency halves.
pub const AIMD_DECREASE_BELOW: f64 = 0.70;

/// Neutral signal weight; weighters never go below it.
pub const NEUTRAL_WEIGHT: f64 = 1.0;

/// Upper bound for model-computed signal weights.
pub const MAX_SIGNAL_WEIGHT: f64 = 3.0;

/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".scry";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = ".scry/config.toml";

/// Default endpoint of the local indexing core service.
pub const DEFAULT_CORE_URL: &str = "http://127.0.0.1:7341";

/// Maximum summary text size in characters.
pub const MAX_SUMMARY_CHARS: usize = 4096;

/// Maximum number of key signatures in a file summary.
pub const MAX_SUMMARY_SIGNATURES: usize = 20;
