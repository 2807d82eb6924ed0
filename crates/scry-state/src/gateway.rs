use reqwest::blocking::Client;
use scry_core::cache::ClientCache;
use scry_core::constants::{MAX_GRAPH_DEPTH, MAX_GRAPH_FANOUT, MAX_POOL_SIZE};
use scry_core::error::GatewayError;
use scry_core::types::{
    ChunkForEmbedding, FileInfo, FunctionContext, IncrementalIndexReport, IndexReport,
    SearchResult, SignalWeights, SummaryChunk, Symbol,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

static CORE_HTTP_CLIENTS: ClientCache<u64, Client> = ClientCache::new(4);

/// One retrieval request against the indexing core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayQuery {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub pool_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub chunk_enabled: bool,
    pub weights: SignalWeights,
    /// Extra keyword text mined from the query, searched alongside `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_bm25_text: Option<String>,
    #[serde(default)]
    pub exact_match_terms: Vec<String>,
}

impl GatewayQuery {
    pub fn new(text: impl Into<String>, pool_size: usize) -> Self {
        Self {
            text: text.into(),
            vector: None,
            pool_size,
            language: None,
            path_prefix: None,
            chunk_enabled: false,
            weights: SignalWeights::default(),
            aux_bm25_text: None,
            exact_match_terms: Vec::new(),
        }
    }

    /// Rejects pool sizes the core does not accept.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(GatewayError::invalid_request(format!(
                "pool_size must be within 1..={MAX_POOL_SIZE}, got {}",
                self.pool_size
            )));
        }
        Ok(())
    }
}

/// Clamp a function-context request to the core's traversal bounds.
pub fn clamp_graph_bounds(max_depth: u32, max_fanout: usize) -> (u32, usize) {
    (
        max_depth.clamp(1, MAX_GRAPH_DEPTH),
        max_fanout.clamp(1, MAX_GRAPH_FANOUT),
    )
}

/// Call boundary into the external indexing core.
///
/// Implementations wrap every core failure into [`GatewayError`]; callers never
/// see the core's own error types.
pub trait RetrievalGateway: Send + Sync {
    fn search(&self, query: &GatewayQuery) -> Result<Vec<SearchResult>, GatewayError>;

    fn find_symbol(&self, name: &str) -> Result<Vec<Symbol>, GatewayError>;

    fn get_file_outline(&self, path: &str) -> Result<Vec<Symbol>, GatewayError>;

    fn get_function_context(
        &self,
        symbol_id: &str,
        max_depth: u32,
        max_fanout: usize,
    ) -> Result<Option<FunctionContext>, GatewayError>;

    fn index_full(&self, root: &Path, chunk_enabled: bool) -> Result<IndexReport, GatewayError>;

    fn index_incremental(
        &self,
        root: &Path,
        chunk_enabled: bool,
    ) -> Result<IncrementalIndexReport, GatewayError>;

    /// An empty page means the listing is exhausted.
    fn list_symbols_for_embedding(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Symbol>, GatewayError>;

    fn list_chunks_for_embedding(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChunkForEmbedding>, GatewayError>;

    fn get_symbols_by_ids(&self, ids: &[String]) -> Result<Vec<Symbol>, GatewayError>;

    fn add_vectors(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<(), GatewayError>;

    fn list_indexed_files(&self) -> Result<Vec<FileInfo>, GatewayError>;

    fn upsert_summary_chunks(&self, chunks: &[SummaryChunk]) -> Result<usize, GatewayError>;

    fn flush(&self) -> Result<(), GatewayError>;
}

/// Blocking JSON client for the indexing core's local service.
///
/// Every operation is `POST {base_url}/v1/{operation}` with a JSON body.
pub struct HttpRetrievalGateway {
    base_url: String,
    client: Client,
}

impl HttpRetrievalGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let timeout_ms = timeout.as_millis() as u64;
        let client = CORE_HTTP_CLIENTS.get_or_try_insert(timeout_ms, || {
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(GatewayError::transport)
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, GatewayError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/v1/{operation}", self.base_url);
        debug!(operation, "core request");
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .map_err(GatewayError::transport)?;

        let status = response.status();
        let body: serde_json::Value = if status.is_success() {
            response.json().map_err(GatewayError::decode)?
        } else {
            // Error bodies are optional; fall back to the status alone.
            match response.json::<serde_json::Value>() {
                Ok(body) if core_error_message(&body).is_some() => body,
                _ => return Err(GatewayError::http(operation, status.as_u16())),
            }
        };

        if let Some(message) = core_error_message(&body) {
            return Err(GatewayError::core(message));
        }
        serde_json::from_value(body).map_err(GatewayError::decode)
    }
}

fn core_error_message(body: &serde_json::Value) -> Option<String> {
    let error = body.as_object()?.get("error")?;
    match error {
        serde_json::Value::Null => None,
        serde_json::Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Serialize)]
struct NameRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct PathRequest<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct ContextRequest<'a> {
    symbol_id: &'a str,
    max_depth: u32,
    max_fanout: usize,
}

#[derive(Serialize)]
struct IndexRequest<'a> {
    root: &'a str,
    chunk_enabled: bool,
}

#[derive(Serialize)]
struct PageRequest {
    limit: usize,
    offset: usize,
}

#[derive(Serialize)]
struct IdsRequest<'a> {
    ids: &'a [String],
}

#[derive(Serialize)]
struct VectorsRequest<'a> {
    ids: &'a [String],
    vectors: &'a [Vec<f32>],
}

#[derive(Serialize)]
struct SummariesRequest<'a> {
    chunks: &'a [SummaryChunk],
}

#[derive(Serialize)]
struct Empty {}

#[derive(Deserialize)]
struct Upserted {
    upserted: usize,
}

#[derive(Deserialize)]
struct Ack {}

impl RetrievalGateway for HttpRetrievalGateway {
    fn search(&self, query: &GatewayQuery) -> Result<Vec<SearchResult>, GatewayError> {
        query.validate()?;
        self.call("search", query)
    }

    fn find_symbol(&self, name: &str) -> Result<Vec<Symbol>, GatewayError> {
        self.call("find_symbol", &NameRequest { name })
    }

    fn get_file_outline(&self, path: &str) -> Result<Vec<Symbol>, GatewayError> {
        self.call("file_outline", &PathRequest { path })
    }

    fn get_function_context(
        &self,
        symbol_id: &str,
        max_depth: u32,
        max_fanout: usize,
    ) -> Result<Option<FunctionContext>, GatewayError> {
        let (max_depth, max_fanout) = clamp_graph_bounds(max_depth, max_fanout);
        self.call(
            "function_context",
            &ContextRequest {
                symbol_id,
                max_depth,
                max_fanout,
            },
        )
    }

    fn index_full(&self, root: &Path, chunk_enabled: bool) -> Result<IndexReport, GatewayError> {
        let root = root.to_string_lossy();
        self.call(
            "index_full",
            &IndexRequest {
                root: &root,
                chunk_enabled,
            },
        )
    }

    fn index_incremental(
        &self,
        root: &Path,
        chunk_enabled: bool,
    ) -> Result<IncrementalIndexReport, GatewayError> {
        let root = root.to_string_lossy();
        self.call(
            "index_incremental",
            &IndexRequest {
                root: &root,
                chunk_enabled,
            },
        )
    }

    fn list_symbols_for_embedding(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Symbol>, GatewayError> {
        self.call("list_symbols_for_embedding", &PageRequest { limit, offset })
    }

    fn list_chunks_for_embedding(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChunkForEmbedding>, GatewayError> {
        self.call("list_chunks_for_embedding", &PageRequest { limit, offset })
    }

    fn get_symbols_by_ids(&self, ids: &[String]) -> Result<Vec<Symbol>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.call("symbols_by_ids", &IdsRequest { ids })
    }

    fn add_vectors(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<(), GatewayError> {
        if ids.len() != vectors.len() {
            return Err(GatewayError::invalid_request(format!(
                "add_vectors: {} ids for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        if ids.is_empty() {
            return Ok(());
        }
        let _: Ack = self.call("add_vectors", &VectorsRequest { ids, vectors })?;
        Ok(())
    }

    fn list_indexed_files(&self) -> Result<Vec<FileInfo>, GatewayError> {
        self.call("indexed_files", &Empty {})
    }

    fn upsert_summary_chunks(&self, chunks: &[SummaryChunk]) -> Result<usize, GatewayError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let response: Upserted = self.call("upsert_summary_chunks", &SummariesRequest { chunks })?;
        Ok(response.upserted)
    }

    fn flush(&self) -> Result<(), GatewayError> {
        let _: Ack = self.call("flush", &Empty {})?;
        Ok(())
    }
}
