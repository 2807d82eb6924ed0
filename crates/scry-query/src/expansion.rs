use crate::chat::{ChatClient, ChatMessage, ChatOptions, ChatSettings, strip_think_tags};
use scry_core::config::ExpansionConfig;
use scry_core::error::ProviderError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const EXPANSION_BACKOFF_CAP: Duration = Duration::from_secs(15);

const EXPANSION_PROMPT: &str = "\
You are a code search query expander. Given a natural language search query about code, \
generate additional search terms that would help find the relevant source code.

Include:
- Likely function/class/variable names (e.g. \"parse_xml\", \"XMLParser\")
- Common abbreviations and acronyms used in code
- Related technical terms and synonyms
- File path segments that might contain the code (e.g. \"utils\", \"models\")

Return ONLY a single line of space-separated terms. No explanation, no numbering, no punctuation.

Query: {query}
Terms:";

/// Augments a query with extra keyword-search terms.
pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str) -> Result<String, ProviderError>;
}

pub struct LlmQueryExpander {
    chat: ChatClient,
    max_tokens: u32,
    max_terms: usize,
}

impl LlmQueryExpander {
    pub fn new(chat: ChatClient, max_tokens: u32, max_terms: usize) -> Self {
        Self {
            chat,
            max_tokens: max_tokens.max(1),
            max_terms: max_terms.max(1),
        }
    }
}

impl QueryExpander for LlmQueryExpander {
    fn expand(&self, query: &str) -> Result<String, ProviderError> {
        let content = self.chat.complete(
            &[ChatMessage::user(EXPANSION_PROMPT.replace("{query}", query))],
            ChatOptions {
                max_tokens: Some(self.max_tokens),
                json_object: false,
            },
        )?;
        let expanded = append_terms(query, strip_think_tags(&content), self.max_terms);
        debug!(query, expanded = %expanded, "query expanded");
        Ok(expanded)
    }
}

/// `"{query} {terms}"` from the first line of the answer, or the query itself
/// when the answer has no terms.
fn append_terms(query: &str, answer: &str, max_terms: usize) -> String {
    let first_line = answer.lines().next().unwrap_or_default().trim();
    let terms: Vec<&str> = first_line.split_whitespace().take(max_terms).collect();
    if terms.is_empty() {
        query.to_string()
    } else {
        format!("{query} {}", terms.join(" "))
    }
}

pub fn build_query_expander(
    config: &ExpansionConfig,
) -> Result<Option<Arc<dyn QueryExpander>>, ProviderError> {
    match config.backend.as_str() {
        "none" => Ok(None),
        backend @ ("siliconflow" | "openai") => {
            let settings = ChatSettings::for_backend(
                backend,
                config.model.as_deref(),
                config.base_url.as_deref(),
                config.api_key_env.as_deref(),
                Duration::from_millis(config.timeout_ms.max(1)),
            );
            let chat = ChatClient::new(&settings, EXPANSION_BACKOFF_CAP)?;
            Ok(Some(Arc::new(LlmQueryExpander::new(
                chat,
                config.max_tokens,
                config.max_terms,
            ))))
        }
        other => Err(ProviderError::Unsupported(format!("expansion backend {other}"))),
    }
}
