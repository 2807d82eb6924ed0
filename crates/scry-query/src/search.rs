//! Query orchestration: expansion, identifier mining, embedding, weighting,
//! retrieval, reranking, file aggregation and score-gap truncation, in that order.
//!
//! Expansion, weighting and reranking fail open. Query embedding and retrieval
//! failures surface as [`SearchError`].

use crate::aggregate::{ScorePenalties, TierRules, aggregate_by_file, flatten_representatives};
use crate::expansion::QueryExpander;
use crate::identifiers::extract_identifiers;
use crate::rerank::Reranker;
use crate::signal_weighting::SignalWeighter;
use crate::truncate::{ScoreGap, truncation_floor};
use scry_core::config::Config;
use scry_core::constants::{
    DEFAULT_LIMIT, DEFAULT_MIN_RESULTS, DEFAULT_RERANK_POOL_SIZE, MAX_POOL_SIZE,
    POOL_LIMIT_MULTIPLIER,
};
use scry_core::error::{ProviderError, SearchError};
use scry_core::types::{FileGroup, SearchResult, SignalWeights};
use scry_state::embedding::EmbeddingProvider;
use scry_state::gateway::{GatewayQuery, RetrievalGateway};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Per-call search options.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub limit: usize,
    pub language: Option<String>,
    /// Project-relative path prefix filter.
    pub path_prefix: Option<String>,
    pub dedupe_by_file: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            language: None,
            path_prefix: None,
            dedupe_by_file: true,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// Tunables shared by every query a pipeline serves.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub rerank_pool_size: usize,
    pub chunk_enabled: bool,
    /// Truncation floor; the effective floor is `min(limit, min_results)`.
    pub min_results: usize,
    pub score_gap: ScoreGap,
    pub tier_rules: TierRules,
    pub penalties: ScorePenalties,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            rerank_pool_size: DEFAULT_RERANK_POOL_SIZE,
            chunk_enabled: false,
            min_results: DEFAULT_MIN_RESULTS,
            score_gap: ScoreGap::default(),
            tier_rules: TierRules::default(),
            penalties: ScorePenalties::default(),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rerank_pool_size: config.rerank.pool_size.min(MAX_POOL_SIZE),
            chunk_enabled: config.core.chunk_enabled,
            min_results: config.search.min_results,
            score_gap: ScoreGap {
                ratio: config.search.score_gap_ratio,
            },
            tier_rules: TierRules::default(),
            penalties: ScorePenalties {
                graph_only: config.search.graph_only_penalty,
                single_signal: config.search.single_signal_penalty,
            },
        }
    }
}

pub struct SearchPipeline {
    gateway: Arc<dyn RetrievalGateway>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
    expander: Option<Arc<dyn QueryExpander>>,
    weighter: Option<Arc<dyn SignalWeighter>>,
    options: PipelineOptions,
}

impl SearchPipeline {
    pub fn new(gateway: Arc<dyn RetrievalGateway>) -> Self {
        Self {
            gateway,
            embedder: None,
            reranker: None,
            expander: None,
            weighter: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_expander(mut self, expander: Option<Arc<dyn QueryExpander>>) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_weighter(mut self, weighter: Option<Arc<dyn SignalWeighter>>) -> Self {
        self.weighter = weighter;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Ranked hits, at most `limit`. With `dedupe_by_file` each file appears once.
    pub fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if options.limit == 0 {
            return Ok(Vec::new());
        }
        let pool = self.retrieve_and_rerank(query, options)?;
        let floor = truncation_floor(self.options.min_results, options.limit);

        let mut results = if options.dedupe_by_file {
            let groups = self.group_and_truncate(pool, floor);
            flatten_representatives(groups)
        } else {
            self.options
                .score_gap
                .truncate(pool, floor, SearchResult::effective_score)
        };
        results.truncate(options.limit);
        Ok(results)
    }

    /// File-level view of the same ranking. Always grouped, regardless of
    /// `dedupe_by_file`; at most `limit` groups.
    pub fn search_groups(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FileGroup>, SearchError> {
        if options.limit == 0 {
            return Ok(Vec::new());
        }
        let pool = self.retrieve_and_rerank(query, options)?;
        let floor = truncation_floor(self.options.min_results, options.limit);
        let mut groups = self.group_and_truncate(pool, floor);
        groups.truncate(options.limit);
        Ok(groups)
    }

    fn group_and_truncate(&self, pool: Vec<SearchResult>, floor: usize) -> Vec<FileGroup> {
        let groups = aggregate_by_file(pool, &self.options.tier_rules, &self.options.penalties);
        self.options
            .score_gap
            .truncate(groups, floor, |group| group.effective_score)
    }

    fn retrieve_and_rerank(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let started = Instant::now();
        let search_text = self.expand(query);
        let identifiers = extract_identifiers(query);
        let vector = self.embed_query(query)?;
        let weights = self.weights(query);
        let pool_size = self.pool_size(options);

        let request = GatewayQuery {
            text: search_text,
            vector,
            pool_size,
            language: options.language.clone(),
            path_prefix: options.path_prefix.clone(),
            chunk_enabled: self.options.chunk_enabled,
            weights,
            aux_bm25_text: (!identifiers.is_empty()).then(|| identifiers.join(" ")),
            exact_match_terms: identifiers,
        };
        let candidates = self.gateway.search(&request)?;
        let retrieved = candidates.len();
        let results = self.rerank(query, candidates, pool_size);

        debug!(
            pool_size,
            retrieved,
            identifiers = request.exact_match_terms.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval finished"
        );
        Ok(results)
    }

    fn expand(&self, query: &str) -> String {
        let Some(expander) = &self.expander else {
            return query.to_string();
        };
        match expander.expand(query) {
            Ok(expanded) => expanded,
            Err(err) => {
                warn!(reason = %err.reason_code(), "query expansion failed, using original query");
                query.to_string()
            }
        }
    }

    fn embed_query(&self, query: &str) -> Result<Option<Vec<f32>>, SearchError> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        let vector = embedder
            .embed(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ProviderError::invalid_response(embedder.model_id(), "no vector for query")
            })?;
        Ok(Some(vector))
    }

    fn weights(&self, query: &str) -> SignalWeights {
        let Some(weighter) = &self.weighter else {
            return SignalWeights::default();
        };
        match weighter.compute_weights(query) {
            Ok(weights) => weights.clamped(),
            Err(err) => {
                warn!(reason = %err.reason_code(), "signal weighting failed, using neutral weights");
                SignalWeights::default()
            }
        }
    }

    /// Widen the pool when a reranker or file dedupe will thin it out.
    fn pool_size(&self, options: &SearchOptions) -> usize {
        let wanted = if self.reranker.is_some() || options.dedupe_by_file {
            options
                .limit
                .saturating_mul(POOL_LIMIT_MULTIPLIER)
                .max(self.options.rerank_pool_size)
        } else {
            options.limit
        };
        wanted.min(MAX_POOL_SIZE)
    }

    fn rerank(&self, query: &str, candidates: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
        let Some(reranker) = &self.reranker else {
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }
        // Keep a copy so a failing reranker leaves retrieval order intact.
        match reranker.rerank(query, candidates.clone(), top_k) {
            Ok(reranked) => reranked,
            Err(err) => {
                warn!(
                    reranker = reranker.name(),
                    reason = %err.reason_code(),
                    "reranking failed, keeping retrieval order"
                );
                candidates
            }
        }
    }
}
