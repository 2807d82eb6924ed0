use crate::constants::{MAX_SIGNAL_WEIGHT, NEUTRAL_WEIGHT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Symbol kinds reported by the indexing core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Trait,
    Enum,
    Module,
    Constant,
    Variable,
    Field,
    TypeAlias,
    #[serde(other)]
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Trait => "trait",
            Self::Enum => "enum",
            Self::Module => "module",
            Self::Constant => "constant",
            Self::Variable => "variable",
            Self::Field => "field",
            Self::TypeAlias => "type_alias",
            Self::Other => "other",
        }
    }

    pub fn parse_kind(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "function" | "fn" | "func" | "def" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "struct" => Self::Struct,
            "interface" => Self::Interface,
            "trait" => Self::Trait,
            "enum" => Self::Enum,
            "module" | "mod" => Self::Module,
            "constant" | "const" => Self::Constant,
            "variable" | "var" => Self::Variable,
            "field" => Self::Field,
            "type_alias" | "type" => Self::TypeAlias,
            _ => Self::Other,
        }
    }

    /// Type-like kinds: listed first in summaries.
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            Self::Class | Self::Struct | Self::Interface | Self::Trait | Self::Enum
        )
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A symbol definition as stored by the indexing core. Read-only on this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub language: String,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    /// Only populated by the embedding listing endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
}

/// A retrieval channel that contributed to a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSignal {
    Bm25,
    Vector,
    Exact,
    ChunkBm25,
    Graph,
    GraphCallers,
    GraphCallees,
    GraphHierarchy,
}

impl MatchSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bm25 => "bm25",
            Self::Vector => "vector",
            Self::Exact => "exact",
            Self::ChunkBm25 => "chunk_bm25",
            Self::Graph => "graph",
            Self::GraphCallers => "graph_callers",
            Self::GraphCallees => "graph_callees",
            Self::GraphHierarchy => "graph_hierarchy",
        }
    }

    pub fn is_graph(&self) -> bool {
        matches!(
            self,
            Self::Graph | Self::GraphCallers | Self::GraphCallees | Self::GraphHierarchy
        )
    }
}

impl std::fmt::Display for MatchSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Chunk provenance for hits that came from chunk-level retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub context_path: String,
    pub chunk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub symbol_id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    #[serde(default)]
    pub match_signals: Vec<MatchSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_symbols: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
}

impl SearchResult {
    /// `rerank_score` when present, otherwise the retrieval score.
    pub fn effective_score(&self) -> f64 {
        self.rerank_score.unwrap_or(self.score)
    }

    /// True when every contributing signal is a graph-expansion marker.
    pub fn is_graph_only(&self) -> bool {
        !self.match_signals.is_empty() && self.match_signals.iter().all(MatchSignal::is_graph)
    }

    /// Number of distinct channels that produced this hit.
    pub fn distinct_signal_count(&self) -> usize {
        self.match_signals.iter().collect::<BTreeSet<_>>().len()
    }
}

/// Coarse file priority bucket. Ordering is the presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Source = 0,
    Test = 1,
    LowValue = 2,
}

impl Tier {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Per-file view of a query's hits. Built per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileGroup {
    pub file_path: String,
    /// Representative first, then the remaining members in retrieval order.
    pub results: Vec<SearchResult>,
    pub effective_score: f64,
    pub tier: Tier,
    pub signals: BTreeSet<MatchSignal>,
}

impl FileGroup {
    pub fn representative(&self) -> Option<&SearchResult> {
        self.results.first()
    }
}

/// Per-signal fusion multipliers. Neutral is 1.0; nothing is ever suppressed below it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub bm25: f64,
    pub vector: f64,
    pub exact: f64,
    pub chunk_bm25: f64,
    pub graph: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            bm25: NEUTRAL_WEIGHT,
            vector: NEUTRAL_WEIGHT,
            exact: NEUTRAL_WEIGHT,
            chunk_bm25: NEUTRAL_WEIGHT,
            graph: NEUTRAL_WEIGHT,
        }
    }
}

impl SignalWeights {
    /// Clamp every channel into `[1.0, 3.0]`. Non-finite values become neutral.
    pub fn clamped(self) -> Self {
        fn clamp(value: f64) -> f64 {
            if value.is_finite() {
                value.clamp(NEUTRAL_WEIGHT, MAX_SIGNAL_WEIGHT)
            } else {
                NEUTRAL_WEIGHT
            }
        }
        Self {
            bm25: clamp(self.bm25),
            vector: clamp(self.vector),
            exact: clamp(self.exact),
            chunk_bm25: clamp(self.chunk_bm25),
            graph: clamp(self.graph),
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Weight for a signal; graph sub-signals share the graph weight.
    pub fn for_signal(&self, signal: MatchSignal) -> f64 {
        match signal {
            MatchSignal::Bm25 => self.bm25,
            MatchSignal::Vector => self.vector,
            MatchSignal::Exact => self.exact,
            MatchSignal::ChunkBm25 => self.chunk_bm25,
            MatchSignal::Graph
            | MatchSignal::GraphCallers
            | MatchSignal::GraphCallees
            | MatchSignal::GraphHierarchy => self.graph,
        }
    }

    pub fn min_weight(&self) -> f64 {
        [self.bm25, self.vector, self.exact, self.chunk_bm25, self.graph]
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexReport {
    pub total_files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub total_symbols: usize,
    pub total_relations: usize,
    pub total_chunks: usize,
    pub duration_secs: f64,
}

/// Outcome of an incremental pass; the only input to the embedding selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalIndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub total_symbols: usize,
    pub total_relations: usize,
    pub total_chunks: usize,
    pub changed_symbol_ids: Vec<String>,
    pub removed_symbol_ids: Vec<String>,
    pub fell_back_to_full: bool,
    pub duration_secs: f64,
}

/// Chunk view returned by the chunk embedding listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkForEmbedding {
    pub id: String,
    pub file_path: String,
    #[serde(default)]
    pub context_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallChainNode {
    pub symbol_id: String,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub line: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionContext {
    pub symbol: Symbol,
    #[serde(default)]
    pub callers: Vec<CallChainNode>,
    #[serde(default)]
    pub callees: Vec<CallChainNode>,
    #[serde(default)]
    pub hierarchy: Vec<CallChainNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub language: String,
    #[serde(default)]
    pub symbol_count: usize,
}

/// File-level summary text stored as a searchable chunk by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryChunk {
    pub file_path: String,
    pub language: String,
    pub content: String,
}

/// Totals of one embedding sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingSweepReport {
    pub embedded: usize,
    pub failed_batches: usize,
    /// Batches stopped by cancellation; not counted as failures.
    pub aborted_batches: usize,
    pub batches_submitted: usize,
    pub cancelled: bool,
}
