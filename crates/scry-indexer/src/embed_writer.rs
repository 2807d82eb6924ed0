use crate::adaptive::AdaptiveConcurrencyController;
use crate::scheduler::{CancellationToken, EmbeddingScheduler};
use scry_core::config::AdaptiveConfig;
use scry_core::constants::EMBEDDING_BATCH_SIZE;
use scry_core::error::{IndexingError, ProviderError};
use scry_core::types::{EmbeddingSweepReport, IncrementalIndexReport};
use scry_state::embedding::{self, EmbeddingProvider};
use scry_state::gateway::RetrievalGateway;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pulls symbols or chunks from the core, embeds them and writes the vectors back.
#[derive(Clone)]
pub struct EmbeddingWriter {
    gateway: Arc<dyn RetrievalGateway>,
    provider: Arc<dyn EmbeddingProvider>,
    adaptive: AdaptiveConfig,
}

impl EmbeddingWriter {
    pub fn new(gateway: Arc<dyn RetrievalGateway>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            gateway,
            provider,
            adaptive: AdaptiveConfig::default(),
        }
    }

    /// Tune the sweep's concurrency controller.
    pub fn with_adaptive(mut self, adaptive: AdaptiveConfig) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Embed one page of the symbol listing. Returns 0 once the listing is exhausted.
    pub fn embed_symbol_batch(
        &self,
        offset: usize,
        limit: usize,
        token: &CancellationToken,
    ) -> Result<usize, IndexingError> {
        let symbols = self.gateway.list_symbols_for_embedding(limit, offset)?;
        if symbols.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = symbols.iter().map(|s| s.id.clone()).collect();
        let texts: Vec<String> = symbols.iter().map(embedding::symbol_embedding_text).collect();
        self.write(&ids, &texts, token)
    }

    pub fn embed_chunk_batch(
        &self,
        offset: usize,
        limit: usize,
        token: &CancellationToken,
    ) -> Result<usize, IndexingError> {
        let chunks = self.gateway.list_chunks_for_embedding(limit, offset)?;
        if chunks.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let texts: Vec<String> = chunks.iter().map(embedding::chunk_embedding_text).collect();
        self.write(&ids, &texts, token)
    }

    /// Embed exactly the given symbols. Ids the core no longer knows are skipped.
    pub fn embed_symbol_ids(
        &self,
        ids: &[String],
        token: &CancellationToken,
    ) -> Result<usize, IndexingError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let symbols = self.gateway.get_symbols_by_ids(ids)?;
        if symbols.is_empty() {
            return Ok(0);
        }
        let found: Vec<String> = symbols.iter().map(|s| s.id.clone()).collect();
        let texts: Vec<String> = symbols.iter().map(embedding::symbol_embedding_text).collect();
        self.write(&found, &texts, token)
    }

    /// The token is checked before the provider call and again before any
    /// vector is written, so a cancelled batch writes nothing.
    fn write(
        &self,
        ids: &[String],
        texts: &[String],
        token: &CancellationToken,
    ) -> Result<usize, IndexingError> {
        if token.is_cancelled() {
            return Err(IndexingError::Cancelled);
        }
        let vectors = self.provider.embed(texts)?;
        if vectors.len() != ids.len() {
            return Err(ProviderError::invalid_response(
                self.provider.model_id(),
                format!("expected {} vectors, got {}", ids.len(), vectors.len()),
            )
            .into());
        }
        if token.is_cancelled() {
            return Err(IndexingError::Cancelled);
        }
        self.gateway.add_vectors(ids, &vectors)?;
        debug!(count = ids.len(), model = self.provider.model_id(), "vectors written");
        Ok(ids.len())
    }

    fn scheduler(&self) -> EmbeddingScheduler {
        EmbeddingScheduler::new(AdaptiveConcurrencyController::for_provider_with(
            self.provider.category(),
            &self.adaptive,
        ))
    }

    /// Embed every symbol in the core, then flush.
    pub fn embed_all(&self, token: &CancellationToken) -> Result<EmbeddingSweepReport, IndexingError> {
        let report = self
            .scheduler()
            .run(|offset, limit| self.embed_symbol_batch(offset, limit, token), token);
        self.gateway.flush()?;
        info!(embedded = report.embedded, "symbol embedding sweep flushed");
        Ok(report)
    }

    pub fn embed_all_chunks(
        &self,
        token: &CancellationToken,
    ) -> Result<EmbeddingSweepReport, IndexingError> {
        let report = self
            .scheduler()
            .run(|offset, limit| self.embed_chunk_batch(offset, limit, token), token);
        self.gateway.flush()?;
        info!(embedded = report.embedded, "chunk embedding sweep flushed");
        Ok(report)
    }
}

/// What to embed after an incremental index run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingPlan {
    FullSweep,
    ChangedOnly(Vec<String>),
    Skip,
}

/// Picks the cheapest embedding work that keeps vectors in sync with an
/// incremental update. Stateless: every report gets a fresh decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementalEmbeddingSelector;

impl IncrementalEmbeddingSelector {
    pub fn select(report: &IncrementalIndexReport) -> EmbeddingPlan {
        if report.fell_back_to_full {
            EmbeddingPlan::FullSweep
        } else if !report.changed_symbol_ids.is_empty() {
            EmbeddingPlan::ChangedOnly(report.changed_symbol_ids.clone())
        } else {
            EmbeddingPlan::Skip
        }
    }

    /// Run a plan. `ChangedOnly` works through fixed batches sequentially;
    /// a failed batch is counted and the rest still run.
    pub fn execute(
        plan: &EmbeddingPlan,
        writer: &EmbeddingWriter,
        token: &CancellationToken,
    ) -> Result<EmbeddingSweepReport, IndexingError> {
        match plan {
            EmbeddingPlan::Skip => {
                debug!("no changed symbols, embedding skipped");
                Ok(EmbeddingSweepReport::default())
            }
            EmbeddingPlan::FullSweep => writer.embed_all(token),
            EmbeddingPlan::ChangedOnly(ids) => {
                let mut report = EmbeddingSweepReport::default();
                for batch in ids.chunks(EMBEDDING_BATCH_SIZE) {
                    if token.is_cancelled() {
                        report.cancelled = true;
                        break;
                    }
                    report.batches_submitted += 1;
                    match writer.embed_symbol_ids(batch, token) {
                        Ok(count) => report.embedded += count,
                        Err(IndexingError::Cancelled) => {
                            report.aborted_batches += 1;
                            report.cancelled = true;
                            break;
                        }
                        Err(err) => {
                            report.failed_batches += 1;
                            warn!(batch_len = batch.len(), error = %err, "changed-symbol embedding batch failed");
                        }
                    }
                }
                writer.gateway.flush()?;
                info!(
                    changed = ids.len(),
                    embedded = report.embedded,
                    "changed symbols embedded"
                );
                Ok(report)
            }
        }
    }
}
