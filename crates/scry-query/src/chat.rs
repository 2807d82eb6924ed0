use reqwest::blocking::{Client, Response};
use scry_core::cache::ClientCache;
use scry_core::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::debug;

const SILICONFLOW_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const SILICONFLOW_CHAT_MODEL: &str = "Qwen/Qwen3-8B";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

/// Statuses worth another attempt: rate limiting proxies answer 403, the rest are transient.
const RETRYABLE_STATUSES: &[u16] = &[403, 500, 502, 503, 504];
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(3);

static CHAT_HTTP_CLIENTS: ClientCache<u64, Client> = ClientCache::new(8);

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub max_tokens: Option<u32>,
    /// Ask for `response_format: json_object`.
    pub json_object: bool,
}

/// Endpoint settings for an OpenAI-compatible chat backend.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout: Duration,
}

impl ChatSettings {
    /// Fill unset fields with the backend's defaults (`siliconflow` or `openai`).
    pub fn for_backend(
        backend: &str,
        model: Option<&str>,
        base_url: Option<&str>,
        api_key_env: Option<&str>,
        timeout: Duration,
    ) -> Self {
        let (default_base, default_model, default_key) = match backend {
            "siliconflow" => (SILICONFLOW_BASE_URL, SILICONFLOW_CHAT_MODEL, "SILICONFLOW_API_KEY"),
            _ => (OPENAI_BASE_URL, OPENAI_CHAT_MODEL, "OPENAI_API_KEY"),
        };
        Self {
            provider: backend.to_string(),
            base_url: non_empty(base_url).unwrap_or(default_base).to_string(),
            model: non_empty(model).unwrap_or(default_model).to_string(),
            api_key_env: non_empty(api_key_env).unwrap_or(default_key).to_string(),
            timeout,
        }
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Capped exponential backoff for transient HTTP statuses.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn with_cap(cap: Duration) -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base: DEFAULT_BACKOFF_BASE,
            cap,
        }
    }

    /// Delay before retry number `attempt + 1`: `min(base * 2^attempt, cap)`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1_u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

pub(crate) fn resolve_api_key(provider: &str, env_var: &str) -> Result<String, ProviderError> {
    std::env::var(env_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ProviderError::missing_api_key(provider, env_var))
}

/// POST a JSON payload with bearer auth, retrying retryable statuses per `policy`.
pub(crate) fn post_json_with_retry(
    client: &Client,
    provider: &str,
    endpoint: &str,
    api_key: &str,
    payload: &serde_json::Value,
    policy: RetryPolicy,
) -> Result<Response, ProviderError> {
    let mut attempt = 0;
    loop {
        let response = client
            .post(endpoint)
            .bearer_auth(api_key)
            .header("content-type", "application/json")
            .json(payload)
            .send()
            .map_err(|err| ProviderError::transport(provider, err))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        if RETRYABLE_STATUSES.contains(&status) && attempt + 1 < policy.max_attempts {
            let delay = policy.backoff(attempt);
            debug!(provider, status, attempt, ?delay, "retrying provider request");
            thread::sleep(delay);
            attempt += 1;
            continue;
        }
        return Err(ProviderError::http(provider, status));
    }
}

/// Blocking chat-completions client.
pub struct ChatClient {
    provider: String,
    endpoint: String,
    model: String,
    api_key_env: String,
    client: Client,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(settings: &ChatSettings, backoff_cap: Duration) -> Result<Self, ProviderError> {
        let client = shared_http_client(&settings.provider, settings.timeout)?;
        Ok(Self {
            provider: settings.provider.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key_env: settings.api_key_env.clone(),
            client,
            retry: RetryPolicy::with_cap(backoff_cap),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            ..retry
        };
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one completion and return the first choice's message content, trimmed.
    pub fn complete(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<String, ProviderError> {
        let api_key = resolve_api_key(&self.provider, &self.api_key_env)?;

        let mut payload = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
        });
        if let Some(max_tokens) = options.max_tokens {
            payload["max_tokens"] = max_tokens.into();
        }
        if options.json_object {
            payload["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = post_json_with_retry(
            &self.client,
            &self.provider,
            &self.endpoint,
            &api_key,
            &payload,
            self.retry,
        )?;
        let body: ChatResponse = response
            .json()
            .map_err(|err| ProviderError::invalid_response(&self.provider, err.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ProviderError::invalid_response(&self.provider, "no choices in response"))
    }
}

pub(crate) fn shared_http_client(provider: &str, timeout: Duration) -> Result<Client, ProviderError> {
    CHAT_HTTP_CLIENTS.get_or_try_insert(timeout.as_millis() as u64, || {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::transport(provider, err))
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Drop a leading `<think>...</think>` block some reasoning models emit.
pub fn strip_think_tags(content: &str) -> &str {
    if !content.contains("<think>") {
        return content.trim();
    }
    match content.find("</think>") {
        Some(end) => content[end + "</think>".len()..].trim(),
        None => content.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bind_test_listener, serve_sequence};

    fn client_for(base_url: &str, key_env: &str) -> ChatClient {
        let settings = ChatSettings::for_backend(
            "siliconflow",
            None,
            Some(base_url),
            Some(key_env),
            Duration::from_millis(500),
        );
        ChatClient::new(&settings, Duration::from_secs(15))
            .unwrap()
            .with_retry(RetryPolicy {
                max_attempts: 3,
                base: Duration::ZERO,
                cap: Duration::ZERO,
            })
    }

    #[test]
    fn backend_defaults() {
        let settings =
            ChatSettings::for_backend("siliconflow", None, None, None, Duration::from_secs(1));
        assert_eq!(settings.base_url, "https://api.siliconflow.cn/v1");
        assert_eq!(settings.model, "Qwen/Qwen3-8B");

        let settings =
            ChatSettings::for_backend("openai", Some(" "), None, None, Duration::from_secs(1));
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::with_cap(Duration::from_secs(15));
        assert_eq!(policy.backoff(0), Duration::from_secs(3));
        assert_eq!(policy.backoff(1), Duration::from_secs(6));
        assert_eq!(policy.backoff(2), Duration::from_secs(12));
        assert_eq!(policy.backoff(3), Duration::from_secs(15));
        assert_eq!(policy.backoff(64), Duration::from_secs(15));
    }

    #[test]
    fn think_tags_are_stripped() {
        assert_eq!(strip_think_tags("<think>hmm</think>\n answer "), "answer");
        assert_eq!(strip_think_tags("  plain "), "plain");
        assert_eq!(strip_think_tags("<think>never closed"), "<think>never closed");
    }

    #[test]
    fn missing_key_fails_without_a_request() {
        let client = client_for("http://127.0.0.1:9", "SCRY_TEST_CHAT_KEY_NEVER_SET");
        let err = client
            .complete(&[ChatMessage::user("hi")], ChatOptions::default())
            .unwrap_err();
        assert_eq!(err.reason_code(), "siliconflow_missing_api_key");
    }

    #[test]
    fn retries_transient_status_then_succeeds() {
        let Some(listener) = bind_test_listener() else {
            return;
        };
        let addr = listener.local_addr().unwrap();
        let server = serve_sequence(
            listener,
            vec![
                ("503 Service Unavailable", r#"{"error":"busy"}"#.to_string()),
                (
                    "200 OK",
                    r#"{"choices":[{"message":{"content":"  parse_xml XmlParser \n"}}]}"#
                        .to_string(),
                ),
            ],
        );
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("SCRY_TEST_CHAT_RETRY_KEY", "k") };

        let client = client_for(&format!("http://{addr}"), "SCRY_TEST_CHAT_RETRY_KEY");
        let content = client
            .complete(
                &[ChatMessage::user("expand")],
                ChatOptions {
                    max_tokens: Some(80),
                    json_object: false,
                },
            )
            .unwrap();
        let requests = server.join().unwrap();

        assert_eq!(content, "parse_xml XmlParser");
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("POST /chat/completions"));
        assert!(requests[1].contains("\"max_tokens\":80"));
    }

    #[test]
    fn non_retryable_status_is_an_http_error() {
        let Some(listener) = bind_test_listener() else {
            return;
        };
        let addr = listener.local_addr().unwrap();
        let server = serve_sequence(listener, vec![("401 Unauthorized", "{}".to_string())]);
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("SCRY_TEST_CHAT_401_KEY", "k") };

        let client = client_for(&format!("http://{addr}"), "SCRY_TEST_CHAT_401_KEY");
        let err = client
            .complete(&[ChatMessage::user("x")], ChatOptions::default())
            .unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, ProviderError::Http { status: 401, .. }));
    }
}
