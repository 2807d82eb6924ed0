//! Caller-facing facade over the indexing core and the query pipeline.
//!
//! Every path argument is resolved against the project root and rejected if it
//! escapes it, before the gateway sees it.

use crate::expansion::{QueryExpander, build_query_expander};
use crate::rerank::{Reranker, build_reranker};
use crate::search::{PipelineOptions, SearchOptions, SearchPipeline};
use crate::signal_weighting::{SignalWeighter, build_signal_weighter};
use scry_core::config::{AdaptiveConfig, Config};
use scry_core::constants::MAX_POOL_SIZE;
use scry_core::error::{IndexingError, SearchError, SetupError};
use scry_core::types::{
    EmbeddingSweepReport, FileGroup, FunctionContext, IncrementalIndexReport, IndexReport,
    SearchResult, Symbol,
};
use scry_indexer::embed_writer::{EmbeddingWriter, IncrementalEmbeddingSelector};
use scry_indexer::scheduler::CancellationToken;
use scry_indexer::summary::{RuleBasedSummaryGenerator, SUMMARY_BATCH_SIZE, generate_file_summaries};
use scry_state::embedding::{EmbeddingProvider, build_embedding_provider};
use scry_state::gateway::{HttpRetrievalGateway, RetrievalGateway, clamp_graph_bounds};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Providers and tunables for an [`Engine`]. Every provider is optional.
#[derive(Clone, Default)]
pub struct EngineOptions {
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub expander: Option<Arc<dyn QueryExpander>>,
    pub weighter: Option<Arc<dyn SignalWeighter>>,
    pub pipeline: PipelineOptions,
    pub adaptive: AdaptiveConfig,
}

/// An index report plus the embedding work that followed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexOutcome<R> {
    pub report: R,
    /// `None` when no embedding provider is configured.
    pub embedding: Option<EmbeddingSweepReport>,
}

pub struct Engine {
    root: PathBuf,
    gateway: Arc<dyn RetrievalGateway>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    adaptive: AdaptiveConfig,
    chunk_enabled: bool,
    pipeline: SearchPipeline,
}

impl Engine {
    pub fn new(
        project_root: &Path,
        gateway: Arc<dyn RetrievalGateway>,
        options: EngineOptions,
    ) -> Result<Self, SetupError> {
        let root = project_root
            .canonicalize()
            .map_err(|err| SetupError::ProjectRoot {
                path: project_root.display().to_string(),
                reason: err.to_string(),
            })?;

        let mut pipeline_options = options.pipeline;
        if pipeline_options.rerank_pool_size > MAX_POOL_SIZE {
            warn!(
                requested = pipeline_options.rerank_pool_size,
                max = MAX_POOL_SIZE,
                "rerank pool size exceeds the core limit, capping"
            );
            pipeline_options.rerank_pool_size = MAX_POOL_SIZE;
        }
        let chunk_enabled = pipeline_options.chunk_enabled;

        let pipeline = SearchPipeline::new(gateway.clone())
            .with_embedder(options.embedder.clone())
            .with_reranker(options.reranker)
            .with_expander(options.expander)
            .with_weighter(options.weighter)
            .with_options(pipeline_options);

        Ok(Self {
            root,
            gateway,
            embedder: options.embedder,
            adaptive: options.adaptive,
            chunk_enabled,
            pipeline,
        })
    }

    /// Build every configured provider and connect to the core over HTTP.
    pub fn from_config(project_root: &Path, config: &Config) -> Result<Self, SetupError> {
        let gateway = HttpRetrievalGateway::new(
            &config.core.url,
            Duration::from_millis(config.core.timeout_ms.max(1)),
        )?;
        let options = EngineOptions {
            embedder: build_embedding_provider(&config.embedding)?,
            reranker: build_reranker(&config.rerank)?,
            expander: build_query_expander(&config.expansion)?,
            weighter: build_signal_weighter(&config.weighting)?,
            pipeline: PipelineOptions::from_config(config),
            adaptive: config.adaptive.clone(),
        };
        info!(
            core = %config.core.url,
            embedding = %config.embedding.backend,
            rerank = %config.rerank.backend,
            weighting = %config.weighting.backend,
            expansion = %config.expansion.backend,
            "engine configured"
        );
        Self::new(project_root, Arc::new(gateway), options)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    fn writer(&self) -> Option<EmbeddingWriter> {
        self.embedder.as_ref().map(|provider| {
            EmbeddingWriter::new(self.gateway.clone(), provider.clone())
                .with_adaptive(self.adaptive.clone())
        })
    }

    /// Full index, then a full embedding sweep when a provider is configured.
    pub fn index(&self) -> Result<IndexOutcome<IndexReport>, IndexingError> {
        let started = Instant::now();
        let report = self.gateway.index_full(&self.root, self.chunk_enabled)?;
        info!(
            files = report.files_indexed,
            symbols = report.total_symbols,
            chunks = report.total_chunks,
            "full index finished"
        );
        let embedding = match self.writer() {
            Some(writer) => Some(writer.embed_all(&CancellationToken::new())?),
            None => None,
        };
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "index call finished");
        Ok(IndexOutcome { report, embedding })
    }

    /// Incremental index; embedding work is chosen from this run's report.
    pub fn index_incremental(&self) -> Result<IndexOutcome<IncrementalIndexReport>, IndexingError> {
        let report = self.gateway.index_incremental(&self.root, self.chunk_enabled)?;
        info!(
            indexed = report.files_indexed,
            unchanged = report.files_unchanged,
            deleted = report.files_deleted,
            changed_symbols = report.changed_symbol_ids.len(),
            fell_back_to_full = report.fell_back_to_full,
            "incremental index finished"
        );
        let embedding = match self.writer() {
            Some(writer) => {
                let plan = IncrementalEmbeddingSelector::select(&report);
                Some(IncrementalEmbeddingSelector::execute(
                    &plan,
                    &writer,
                    &CancellationToken::new(),
                )?)
            }
            None => None,
        };
        Ok(IndexOutcome { report, embedding })
    }

    pub fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let options = self.scoped_options(options)?;
        self.pipeline.search(query, &options)
    }

    pub fn search_groups(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FileGroup>, SearchError> {
        let options = self.scoped_options(options)?;
        self.pipeline.search_groups(query, &options)
    }

    fn scoped_options(&self, options: &SearchOptions) -> Result<SearchOptions, SearchError> {
        let mut scoped = options.clone();
        if let Some(prefix) = options.path_prefix.as_deref() {
            let mut relative = self.validate_path(prefix)?;
            if (prefix.ends_with('/') || prefix.ends_with('\\')) && !relative.is_empty() {
                relative.push('/');
            }
            scoped.path_prefix = (!relative.is_empty()).then_some(relative);
        }
        Ok(scoped)
    }

    pub fn find_symbol(&self, name: &str) -> Result<Vec<Symbol>, SearchError> {
        Ok(self.gateway.find_symbol(name)?)
    }

    pub fn get_file_outline(&self, path: &str) -> Result<Vec<Symbol>, SearchError> {
        let relative = self.validate_path(path)?;
        Ok(self.gateway.get_file_outline(&relative)?)
    }

    /// Callers, callees and hierarchy of a symbol, bounds clamped to the core's limits.
    pub fn get_function_context(
        &self,
        symbol_id: &str,
        max_depth: u32,
        max_fanout: usize,
    ) -> Result<Option<FunctionContext>, SearchError> {
        let (depth, fanout) = clamp_graph_bounds(max_depth, max_fanout);
        Ok(self.gateway.get_function_context(symbol_id, depth, fanout)?)
    }

    pub fn embed_all(&self, token: &CancellationToken) -> Result<EmbeddingSweepReport, IndexingError> {
        self.writer()
            .ok_or(IndexingError::NoEmbeddingProvider)?
            .embed_all(token)
    }

    pub fn embed_all_chunks(
        &self,
        token: &CancellationToken,
    ) -> Result<EmbeddingSweepReport, IndexingError> {
        self.writer()
            .ok_or(IndexingError::NoEmbeddingProvider)?
            .embed_all_chunks(token)
    }

    /// Rule-based summaries for every indexed file. Returns how many were stored.
    pub fn generate_summaries(&self) -> Result<usize, IndexingError> {
        let stored = generate_file_summaries(
            self.gateway.as_ref(),
            &RuleBasedSummaryGenerator,
            SUMMARY_BATCH_SIZE,
        )?;
        self.gateway.flush()?;
        info!(stored, "file summaries generated");
        Ok(stored)
    }

    pub fn flush(&self) -> Result<(), IndexingError> {
        Ok(self.gateway.flush()?)
    }

    /// Project-relative, `/`-separated form of `path`, or `PathOutsideRoot`.
    fn validate_path(&self, path: &str) -> Result<String, SearchError> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let resolved = resolve_existing_prefix(&normalize_lexically(&joined))
            .map_err(|_| SearchError::path_outside_root(path))?;
        let relative = resolved
            .strip_prefix(&self.root)
            .map_err(|_| SearchError::path_outside_root(path))?;
        Ok(relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Canonicalize the deepest existing ancestor so symlinks are followed even
/// when the leaf does not exist yet.
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
    let mut resolved = existing.canonicalize()?;
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
