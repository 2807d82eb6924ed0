//! Query-adaptive fusion weights.
//!
//! Weighters only ever boost: every channel keeps at least neutral weight so
//! no retrieval signal loses its baseline recall.

use crate::chat::{ChatClient, ChatMessage, ChatOptions, ChatSettings, strip_think_tags};
use regex::Regex;
use scry_core::config::WeightingConfig;
use scry_core::error::ProviderError;
use scry_core::types::SignalWeights;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

const WEIGHTING_BACKOFF_CAP: Duration = Duration::from_secs(15);
const WEIGHTING_MAX_TOKENS: u32 = 120;

const WEIGHTING_PROMPT: &str = "\
You are a code search signal weighter. Given a search query, output JSON weights \
for 5 retrieval signals. Each weight is a float between 1.0 and 3.0.

All weights must be >= 1.0. You may boost important signals above 1.0 but must \
never reduce any signal below 1.0.

Signals:
- bm25: keyword matching in symbol names, signatures, docstrings
- vector: semantic similarity via embeddings
- exact: exact symbol name match
- chunk_bm25: file-level keyword matching in code chunks
- graph: graph traversal from other hits (call graph, inheritance)

Guidelines:
- Symbol name queries (e.g. \"parse_xml\", \"MyClass\") -> exact 2.5, bm25 2.0
- Natural language concept queries -> vector 2.5, graph 2.0
- Architecture queries (\"overall architecture\", \"data flow\") -> graph 2.5, chunk_bm25 2.0
- Chinese or other non-ASCII queries -> vector 2.5, graph 1.5
- Mixed queries -> mild boosts (1.2-1.5) to the most relevant signals

Output ONLY a JSON object with keys: bm25, vector, exact, chunk_bm25, graph.

Query: {query}
Weights:";

pub trait SignalWeighter: Send + Sync {
    fn compute_weights(&self, query: &str) -> Result<SignalWeights, ProviderError>;
}

/// Weights for the rule-based heuristic. Channels a rule does not name stay neutral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightRules {
    pub symbol_like: SignalWeights,
    pub cjk: SignalWeights,
    pub multi_word: SignalWeights,
    pub fallback: SignalWeights,
    /// Word count from which a query counts as natural language.
    pub multi_word_threshold: usize,
}

impl Default for WeightRules {
    fn default() -> Self {
        let neutral = SignalWeights::default();
        Self {
            symbol_like: SignalWeights {
                bm25: 2.0,
                exact: 2.5,
                ..neutral
            },
            cjk: SignalWeights {
                vector: 2.5,
                graph: 1.5,
                ..neutral
            },
            multi_word: SignalWeights {
                vector: 2.0,
                chunk_bm25: 1.2,
                graph: 1.5,
                ..neutral
            },
            fallback: SignalWeights {
                vector: 1.3,
                ..neutral
            },
            multi_word_threshold: 3,
        }
    }
}

static SYMBOL_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("symbol token regex must compile")
});
static CAMEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][A-Z]").expect("camel case regex must compile"));
static SNAKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]_[a-z]").expect("snake case regex must compile"));
static CJK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{4e00}-\x{9fff}\x{3400}-\x{4dbf}]").expect("cjk regex must compile")
});

/// Zero-latency heuristic weighter; never fails.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedSignalWeighter {
    rules: WeightRules,
}

impl RuleBasedSignalWeighter {
    pub fn with_rules(rules: WeightRules) -> Self {
        Self { rules }
    }

    pub fn weights_for(&self, query: &str) -> SignalWeights {
        let stripped = query.trim();
        let word_count = stripped.split_whitespace().count();
        let single_token = word_count == 1;
        let symbol_like = single_token
            && (SYMBOL_TOKEN_RE.is_match(stripped)
                || SNAKE_RE.is_match(stripped)
                || CAMEL_RE.is_match(stripped));

        let weights = if symbol_like {
            self.rules.symbol_like
        } else if CJK_RE.is_match(stripped) {
            self.rules.cjk
        } else if word_count >= self.rules.multi_word_threshold {
            self.rules.multi_word
        } else {
            self.rules.fallback
        };
        weights.clamped()
    }
}

impl SignalWeighter for RuleBasedSignalWeighter {
    fn compute_weights(&self, query: &str) -> Result<SignalWeights, ProviderError> {
        Ok(self.weights_for(query))
    }
}

/// Asks a chat model for the weights.
pub struct LlmSignalWeighter {
    chat: ChatClient,
}

impl LlmSignalWeighter {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }
}

impl SignalWeighter for LlmSignalWeighter {
    fn compute_weights(&self, query: &str) -> Result<SignalWeights, ProviderError> {
        let prompt = WEIGHTING_PROMPT.replace("{query}", query);
        let content = self.chat.complete(
            &[ChatMessage::user(prompt)],
            ChatOptions {
                max_tokens: Some(WEIGHTING_MAX_TOKENS),
                json_object: false,
            },
        )?;
        let weights = parse_weights(strip_think_tags(&content))
            .map_err(|reason| ProviderError::invalid_response(self.chat.provider(), reason))?;
        debug!(query, ?weights, "signal weights computed");
        Ok(weights)
    }
}

/// Parse the first `{...}` object in a model answer. Missing keys are neutral.
fn parse_weights(content: &str) -> Result<SignalWeights, String> {
    let object = match (content.find('{'), content.find('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    };
    let value: serde_json::Value =
        serde_json::from_str(object).map_err(|err| format!("weights are not json: {err}"))?;
    let map = value
        .as_object()
        .ok_or_else(|| "weights are not a json object".to_string())?;
    let read = |key: &str| map.get(key).and_then(serde_json::Value::as_f64).unwrap_or(1.0);
    Ok(SignalWeights {
        bm25: read("bm25"),
        vector: read("vector"),
        exact: read("exact"),
        chunk_bm25: read("chunk_bm25"),
        graph: read("graph"),
    }
    .clamped())
}

/// Build the configured weighter; `none` yields no weighter (neutral weights).
pub fn build_signal_weighter(
    config: &WeightingConfig,
) -> Result<Option<Arc<dyn SignalWeighter>>, ProviderError> {
    match config.backend.as_str() {
        "none" => Ok(None),
        "rule_based" => Ok(Some(Arc::new(RuleBasedSignalWeighter::default()))),
        backend @ ("siliconflow" | "openai") => {
            let settings = ChatSettings::for_backend(
                backend,
                config.model.as_deref(),
                config.base_url.as_deref(),
                config.api_key_env.as_deref(),
                Duration::from_millis(config.timeout_ms.max(1)),
            );
            let chat = ChatClient::new(&settings, WEIGHTING_BACKOFF_CAP)?;
            Ok(Some(Arc::new(LlmSignalWeighter::new(chat))))
        }
        other => Err(ProviderError::Unsupported(format!("weighting backend {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bind_test_listener, serve_sequence};

    fn rule(query: &str) -> SignalWeights {
        RuleBasedSignalWeighter::default().weights_for(query)
    }

    #[test]
    fn symbol_like_queries_boost_exact_and_bm25() {
        for query in ["parse_xml", "HTMLParser", "os.path", "  handler  "] {
            let weights = rule(query);
            assert_eq!(weights.exact, 2.5, "{query}");
            assert_eq!(weights.bm25, 2.0, "{query}");
            assert_eq!(weights.vector, 1.0, "{query}");
        }
    }

    #[test]
    fn cjk_queries_boost_vector_and_graph() {
        let weights = rule("如何 处理 错误");
        assert_eq!(weights.vector, 2.5);
        assert_eq!(weights.graph, 1.5);
        assert_eq!(weights.bm25, 1.0);
    }

    #[test]
    fn natural_language_and_short_queries() {
        let weights = rule("where are retries configured");
        assert_eq!(
            (weights.vector, weights.chunk_bm25, weights.graph),
            (2.0, 1.2, 1.5)
        );
        let weights = rule("retry policy");
        assert_eq!(weights.vector, 1.3);
        assert_eq!(weights.exact, 1.0);
    }

    #[test]
    fn rule_weights_never_drop_below_neutral() {
        for query in ["", "x", "a b", "a b c d e f", "日本", "foo-bar!"] {
            assert!(rule(query).min_weight() >= 1.0, "{query}");
        }
    }

    #[test]
    fn model_answer_parsing_clamps_and_defaults() {
        let weights = parse_weights(
            "Sure: {\"bm25\": 0.2, \"vector\": 9, \"exact\": 2.0} trailing",
        )
        .unwrap();
        assert_eq!(weights.bm25, 1.0);
        assert_eq!(weights.vector, 3.0);
        assert_eq!(weights.exact, 2.0);
        assert_eq!(weights.graph, 1.0);

        assert!(parse_weights("no json here").is_err());
    }

    #[test]
    fn factory_backends() {
        let mut config = WeightingConfig::default();
        assert!(build_signal_weighter(&config).unwrap().is_some());
        config.backend = "none".into();
        assert!(build_signal_weighter(&config).unwrap().is_none());
        config.backend = "siliconflow".into();
        assert!(build_signal_weighter(&config).unwrap().is_some());
        config.backend = "oracle".into();
        assert!(matches!(
            build_signal_weighter(&config),
            Err(ProviderError::Unsupported(_))
        ));
    }

    #[test]
    fn llm_weighter_reads_mock_completion() {
        let Some(listener) = bind_test_listener() else {
            return;
        };
        let addr = listener.local_addr().unwrap();
        let answer = r#"<think>symbol query</think>{\"exact\": 2.5, \"bm25\": 2.0}"#;
        let body = format!(r#"{{"choices":[{{"message":{{"content":"{answer}"}}}}]}}"#);
        let server = serve_sequence(listener, vec![("200 OK", body)]);
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("SCRY_TEST_WEIGHTING_KEY", "k") };

        let config = WeightingConfig {
            backend: "openai".into(),
            base_url: Some(format!("http://{addr}")),
            api_key_env: Some("SCRY_TEST_WEIGHTING_KEY".into()),
            ..WeightingConfig::default()
        };
        let weighter = build_signal_weighter(&config).unwrap().unwrap();
        let weights = weighter.compute_weights("parse_xml").unwrap();
        server.join().unwrap();

        assert_eq!(weights.exact, 2.5);
        assert_eq!(weights.bm25, 2.0);
        assert_eq!(weights.vector, 1.0);
    }
}
