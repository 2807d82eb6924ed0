use crate::chat::{
    ChatClient, ChatMessage, ChatOptions, ChatSettings, RetryPolicy, non_empty,
    post_json_with_retry, resolve_api_key, shared_http_client, strip_think_tags,
};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use reqwest::blocking::Client;
use scry_core::config::RerankConfig;
use scry_core::error::ProviderError;
use scry_core::types::{MatchSignal, SearchResult, SymbolKind};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

const COHERE_BASE_URL: &str = "https://api.cohere.com/v2";
const COHERE_RERANK_MODEL: &str = "rerank-v3.5";
const SILICONFLOW_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const SILICONFLOW_RERANK_MODEL: &str = "Qwen/Qwen3-Reranker-8B";
const API_RERANK_BACKOFF_CAP: Duration = Duration::from_secs(30);
const LLM_RERANK_BACKOFF_CAP: Duration = Duration::from_secs(15);
const DEFAULT_CROSS_ENCODER_MODEL: &str = "JINARerankerV1TurboEn";
const CROSS_ENCODER_BATCH_SIZE: usize = 32;
const SNIPPET_LINES: usize = 20;
const EXACT_NAME_BONUS: f64 = 0.5;

const LLM_RERANK_SYSTEM_PROMPT: &str = "\
You judge how relevant code symbols are to a search query. \
Score each numbered candidate from 0.0 (irrelevant) to 1.0 (exactly what was asked for). \
Answer with a JSON object {\"scores\": [...]} holding one score per candidate, in order.";

/// Reorders a candidate pool. Implementations set `rerank_score` on what they return.
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, ProviderError>;
}

/// Per-kind boost for the rule-based reranker. Kinds missing from the table add nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct KindWeights(HashMap<SymbolKind, f64>);

impl Default for KindWeights {
    fn default() -> Self {
        Self(HashMap::from([
            (SymbolKind::Function, 1.0),
            (SymbolKind::Method, 1.0),
            (SymbolKind::Class, 0.9),
            (SymbolKind::Struct, 0.9),
            (SymbolKind::Interface, 0.8),
            (SymbolKind::Trait, 0.8),
            (SymbolKind::Module, 0.5),
            (SymbolKind::Constant, 0.4),
            (SymbolKind::Variable, 0.3),
            (SymbolKind::Field, 0.3),
        ]))
    }
}

impl KindWeights {
    /// Apply `[rerank.kind_weights]` overrides. Unknown kind names are skipped.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, f64>) -> Self {
        for (name, weight) in overrides {
            let kind = SymbolKind::parse_kind(name);
            if kind == SymbolKind::Other && !name.trim().eq_ignore_ascii_case("other") {
                warn!(kind = %name, "ignoring kind weight for unknown symbol kind");
                continue;
            }
            if !weight.is_finite() {
                warn!(kind = %name, "ignoring non-finite kind weight");
                continue;
            }
            self.0.insert(kind, *weight);
        }
        self
    }

    pub fn weight(&self, kind: SymbolKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or(0.0)
    }
}

/// Deterministic reranker: retrieval score plus kind, signal and exact-name boosts.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedReranker {
    kind_weights: KindWeights,
    signal_weights: HashMap<MatchSignal, f64>,
}

impl RuleBasedReranker {
    pub fn new(kind_weights: KindWeights) -> Self {
        Self {
            kind_weights,
            signal_weights: HashMap::new(),
        }
    }

    /// Override the per-signal bonus (default 1.0 per contributing signal).
    pub fn with_signal_weight(mut self, signal: MatchSignal, weight: f64) -> Self {
        self.signal_weights.insert(signal, weight);
        self
    }

    fn score(&self, query_lower: &str, result: &SearchResult) -> f64 {
        let signal_bonus: f64 = result
            .match_signals
            .iter()
            .map(|signal| self.signal_weights.get(signal).copied().unwrap_or(1.0))
            .sum();
        let exact_bonus = if !query_lower.is_empty()
            && (result.name.to_lowercase().contains(query_lower)
                || result.qualified_name.to_lowercase().contains(query_lower))
        {
            EXACT_NAME_BONUS
        } else {
            0.0
        };
        result.score + self.kind_weights.weight(result.kind) + signal_bonus + exact_bonus
    }
}

impl Reranker for RuleBasedReranker {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let query_lower = query.trim().to_lowercase();
        for result in &mut results {
            result.rerank_score = Some(self.score(&query_lower, result));
        }
        sort_by_rerank_score(&mut results);
        results.truncate(top_k);
        Ok(results)
    }
}

/// Cohere-compatible `POST {base}/rerank` client.
pub struct ApiReranker {
    provider: String,
    endpoint: String,
    model: String,
    api_key_env: String,
    max_results: usize,
    client: Client,
    retry: RetryPolicy,
}

impl ApiReranker {
    pub fn new(
        provider: &str,
        base_url: &str,
        model: &str,
        api_key_env: &str,
        timeout: Duration,
        max_results: usize,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            provider: provider.to_string(),
            endpoint: format!("{}/rerank", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
            max_results,
            client: shared_http_client(provider, timeout)?,
            retry: RetryPolicy::with_cap(API_RERANK_BACKOFF_CAP),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ApiRerankResponse {
    results: Vec<ApiRerankHit>,
}

#[derive(Debug, Deserialize)]
struct ApiRerankHit {
    index: usize,
    relevance_score: f64,
}

impl Reranker for ApiReranker {
    fn name(&self) -> &str {
        &self.provider
    }

    fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let top_n = effective_top_k(top_k, self.max_results, results.len());
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let api_key = resolve_api_key(&self.provider, &self.api_key_env)?;
        let documents: Vec<String> = results.iter().map(api_document_text).collect();
        let payload = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        });
        let response = post_json_with_retry(
            &self.client,
            &self.provider,
            &self.endpoint,
            &api_key,
            &payload,
            self.retry,
        )?;
        let body: ApiRerankResponse = response
            .json()
            .map_err(|err| ProviderError::invalid_response(&self.provider, err.to_string()))?;
        debug!(provider = %self.provider, hits = body.results.len(), "rerank response");

        let scores = body
            .results
            .into_iter()
            .map(|hit| (hit.index, hit.relevance_score));
        pick_by_index(&self.provider, results, scores, top_n)
    }
}

/// Relevance judging through a chat model.
pub struct LlmReranker {
    chat: ChatClient,
    max_results: usize,
}

impl LlmReranker {
    pub fn new(chat: ChatClient, max_results: usize) -> Self {
        Self { chat, max_results }
    }
}

impl Reranker for LlmReranker {
    fn name(&self) -> &str {
        self.chat.provider()
    }

    fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let top_n = effective_top_k(top_k, self.max_results, results.len());
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let mut prompt = format!("Query: {query}\n\nCandidates:\n");
        for (idx, result) in results.iter().enumerate() {
            prompt.push_str(&format!("[{idx}] {}\n", api_document_text(result)));
        }
        let content = self.chat.complete(
            &[ChatMessage::system(LLM_RERANK_SYSTEM_PROMPT), ChatMessage::user(prompt)],
            ChatOptions {
                max_tokens: None,
                json_object: true,
            },
        )?;
        let scores = parse_llm_scores(strip_think_tags(&content))
            .map_err(|reason| ProviderError::invalid_response(self.chat.provider(), reason))?;
        if scores.len() != results.len() {
            return Err(ProviderError::invalid_response(
                self.chat.provider(),
                format!("expected {} scores, got {}", results.len(), scores.len()),
            ));
        }
        for (result, score) in results.iter_mut().zip(scores) {
            result.rerank_score = Some(score);
        }
        sort_by_rerank_score(&mut results);
        results.truncate(top_n);
        Ok(results)
    }
}

fn parse_llm_scores(content: &str) -> Result<Vec<f64>, String> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|err| format!("scores are not json: {err}"))?;
    let list = match &value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => match map.get("scores") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err("missing scores array".to_string()),
        },
        _ => return Err("scores must be an array".to_string()),
    };
    list.iter()
        .map(|item| {
            item.as_f64()
                .ok_or_else(|| format!("score is not a number: {item}"))
        })
        .collect()
}

/// Local cross-encoder. The ONNX model loads on first use.
pub struct CrossEncoderReranker {
    model: RerankerModel,
    max_results: usize,
    runtime: OnceLock<Result<Mutex<TextRerank>, String>>,
}

impl CrossEncoderReranker {
    pub fn new(model_name: Option<&str>, max_results: usize) -> Result<Self, ProviderError> {
        let name = non_empty(model_name).unwrap_or(DEFAULT_CROSS_ENCODER_MODEL);
        Ok(Self {
            model: parse_cross_encoder_model(name)?,
            max_results,
            runtime: OnceLock::new(),
        })
    }

    fn runtime(&self) -> Result<&Mutex<TextRerank>, ProviderError> {
        self.runtime
            .get_or_init(|| {
                let options =
                    RerankInitOptions::new(self.model.clone()).with_show_download_progress(false);
                TextRerank::try_new(options)
                    .map(Mutex::new)
                    .map_err(|err| err.to_string())
            })
            .as_ref()
            .map_err(|reason| ProviderError::runtime("cross_encoder", reason.clone()))
    }
}

fn parse_cross_encoder_model(name: &str) -> Result<RerankerModel, ProviderError> {
    match name {
        "JINARerankerV1TurboEn" | "jinaai/jina-reranker-v1-turbo-en" => {
            Ok(RerankerModel::JINARerankerV1TurboEn)
        }
        "JINARerankerV2BaseMultiligual" | "jinaai/jina-reranker-v2-base-multilingual" => {
            Ok(RerankerModel::JINARerankerV2BaseMultiligual)
        }
        "BGERerankerBase" | "BAAI/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "BGERerankerV2M3" | "rozgo/bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        other => Err(ProviderError::Unsupported(format!(
            "cross encoder model {other}"
        ))),
    }
}

impl Reranker for CrossEncoderReranker {
    fn name(&self) -> &str {
        "cross_encoder"
    }

    fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let top_n = effective_top_k(top_k, self.max_results, results.len());
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let documents: Vec<String> = results.iter().map(cross_encoder_text).collect();
        let runtime = self.runtime()?;
        let mut model = runtime
            .lock()
            .map_err(|_| ProviderError::runtime("cross_encoder", "reranker lock poisoned"))?;
        let ranked = model
            .rerank(query.to_string(), documents, false, Some(CROSS_ENCODER_BATCH_SIZE))
            .map_err(|err| ProviderError::runtime("cross_encoder", err.to_string()))?;
        drop(model);

        let scores = ranked
            .into_iter()
            .map(|hit| (hit.index, f64::from(hit.score)));
        pick_by_index("cross_encoder", results, scores, top_n)
    }
}

/// `min(top_k, max_results, len)`.
fn effective_top_k(top_k: usize, max_results: usize, len: usize) -> usize {
    top_k.min(max_results).min(len)
}

/// `"{file} | {qname} ({kind})"` plus the first lines of the snippet.
fn api_document_text(result: &SearchResult) -> String {
    let mut text = format!(
        "{} | {} ({})",
        result.file_path, result.qualified_name, result.kind
    );
    if let Some(snippet) = result.snippet.as_deref().filter(|s| !s.trim().is_empty()) {
        text.push('\n');
        let head: Vec<&str> = snippet.lines().take(SNIPPET_LINES).collect();
        text.push_str(&head.join("\n"));
    }
    text
}

fn cross_encoder_text(result: &SearchResult) -> String {
    format!("{} ({}) {}", result.qualified_name, result.kind, result.name)
}

/// Attach provider scores by candidate index and keep the best `top_n`.
fn pick_by_index(
    provider: &str,
    results: Vec<SearchResult>,
    scores: impl Iterator<Item = (usize, f64)>,
    top_n: usize,
) -> Result<Vec<SearchResult>, ProviderError> {
    let mut slots: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
    let mut picked = Vec::new();
    for (index, score) in scores {
        let slot = slots.get_mut(index).ok_or_else(|| {
            ProviderError::invalid_response(provider, format!("result index {index} out of range"))
        })?;
        if let Some(mut result) = slot.take() {
            result.rerank_score = Some(score);
            picked.push(result);
        }
    }
    sort_by_rerank_score(&mut picked);
    picked.truncate(top_n);
    Ok(picked)
}

fn sort_by_rerank_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.effective_score().total_cmp(&a.effective_score()));
}

/// Build the configured reranker; `none` disables reranking.
pub fn build_reranker(config: &RerankConfig) -> Result<Option<Arc<dyn Reranker>>, ProviderError> {
    let timeout = Duration::from_millis(config.timeout_ms.max(1));
    let model = non_empty(config.model.as_deref());
    let base_url = non_empty(config.base_url.as_deref());
    let api_key_env = non_empty(config.api_key_env.as_deref());

    let reranker: Arc<dyn Reranker> = match config.backend.as_str() {
        "none" => return Ok(None),
        "rule_based" => Arc::new(RuleBasedReranker::new(
            KindWeights::default().with_overrides(&config.kind_weights),
        )),
        "cross_encoder" => Arc::new(CrossEncoderReranker::new(model, config.max_results)?),
        "cohere" => Arc::new(ApiReranker::new(
            "cohere",
            base_url.unwrap_or(COHERE_BASE_URL),
            model.unwrap_or(COHERE_RERANK_MODEL),
            api_key_env.unwrap_or("COHERE_API_KEY"),
            timeout,
            config.max_results,
        )?),
        "siliconflow" => Arc::new(ApiReranker::new(
            "siliconflow",
            base_url.unwrap_or(SILICONFLOW_BASE_URL),
            model.unwrap_or(SILICONFLOW_RERANK_MODEL),
            api_key_env.unwrap_or("SILICONFLOW_API_KEY"),
            timeout,
            config.max_results,
        )?),
        "api" => {
            let (Some(base_url), Some(model)) = (base_url, model) else {
                return Err(ProviderError::Unsupported(
                    "api reranker requires base_url and model".to_string(),
                ));
            };
            Arc::new(ApiReranker::new(
                "api",
                base_url,
                model,
                api_key_env.unwrap_or("RERANK_API_KEY"),
                timeout,
                config.max_results,
            )?)
        }
        "openai" => {
            let settings = ChatSettings::for_backend("openai", model, base_url, api_key_env, timeout);
            let chat = ChatClient::new(&settings, LLM_RERANK_BACKOFF_CAP)?;
            Arc::new(LlmReranker::new(chat, config.max_results))
        }
        other => return Err(ProviderError::Unsupported(format!("rerank backend {other}"))),
    };
    Ok(Some(reranker))
}
