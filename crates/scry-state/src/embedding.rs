use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use reqwest::blocking::Client;
use scry_core::cache::ClientCache;
use scry_core::config::EmbeddingConfig;
use scry_core::constants::MAX_EMBEDDING_TEXT_CHARS;
use scry_core::error::ProviderError;
use scry_core::types::{ChunkForEmbedding, Symbol};
use serde::Deserialize;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_LOCAL_MODEL: &str = "AllMiniLML6V2";
const DEFAULT_LOCAL_DIMENSIONS: usize = 384;

type SharedTextEmbedding = Arc<Mutex<TextEmbedding>>;

static FASTEMBED_RUNTIMES: ClientCache<String, SharedTextEmbedding> = ClientCache::new(4);
static EMBEDDING_HTTP_CLIENTS: ClientCache<u64, Client> = ClientCache::new(4);

/// How a provider tolerates parallel calls; drives the initial concurrency profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCategory {
    /// In-process model with a single session; not safe to call in parallel.
    Local,
    /// Network API that benefits from several requests in flight.
    Remote,
}

pub trait EmbeddingProvider: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn category(&self) -> ProviderCategory;
    fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Build the configured provider; `Ok(None)` when embeddings are disabled.
pub fn build_embedding_provider(
    config: &EmbeddingConfig,
) -> Result<Option<Arc<dyn EmbeddingProvider>>, ProviderError> {
    let backend = config.backend.trim().to_ascii_lowercase();
    let timeout = Duration::from_millis(config.timeout_ms.max(1));
    let provider: Arc<dyn EmbeddingProvider> = match backend.as_str() {
        "none" | "" => return Ok(None),
        "local" => Arc::new(FastEmbedProvider::from_config(
            config,
            fastembed_runtime_enabled(),
        )?),
        "openai" | "voyage" | "siliconflow" => {
            Arc::new(ExternalEmbeddingProvider::from_config(&backend, config, timeout)?)
        }
        other => return Err(ProviderError::Unsupported(format!("embedding backend {other}"))),
    };
    debug!(
        backend,
        model = provider.model_id(),
        dimensions = provider.dimensions(),
        "embedding provider ready"
    );
    Ok(Some(provider))
}

/// Text embedded for a symbol: name, signature, doc and body joined by spaces.
pub fn symbol_embedding_text(symbol: &Symbol) -> String {
    let mut parts = vec![symbol.qualified_name.as_str()];
    for part in [&symbol.signature, &symbol.doc_comment].into_iter().flatten() {
        if !part.trim().is_empty() {
            parts.push(part);
        }
    }
    if let Some(body) = symbol.body_text.as_deref()
        && !body.trim().is_empty()
    {
        parts.push(truncate_chars(body, MAX_EMBEDDING_TEXT_CHARS));
    }
    parts.join(" ")
}

pub fn chunk_embedding_text(chunk: &ChunkForEmbedding) -> String {
    format!(
        "file: {}\ncontext: {}\n{}",
        chunk.file_path,
        chunk.context_path,
        truncate_chars(&chunk.content, MAX_EMBEDDING_TEXT_CHARS)
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub struct FastEmbedProvider {
    model_id: String,
    dimensions: usize,
    batch_size: usize,
    fastembed_model: Option<EmbeddingModel>,
    enable_runtime: bool,
    runtime: OnceLock<Result<SharedTextEmbedding, String>>,
}

impl FastEmbedProvider {
    pub fn from_config(config: &EmbeddingConfig, enable_runtime: bool) -> Result<Self, ProviderError> {
        let model_id = config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(DEFAULT_LOCAL_MODEL)
            .to_string();
        let Some(fastembed_model) = parse_fastembed_model(&model_id) else {
            return Err(ProviderError::Unsupported(format!(
                "local embedding model {model_id}"
            )));
        };
        let known_dimensions = model_dimensions(&fastembed_model);
        let dimensions = match (known_dimensions, config.dimensions) {
            (Some(known), Some(configured)) if known != configured => {
                return Err(ProviderError::invalid_response(
                    "local",
                    format!(
                        "embedding dimensions mismatch: model={model_id} expected={known} configured={configured}"
                    ),
                ));
            }
            (Some(known), _) => known,
            (None, Some(configured)) => configured,
            (None, None) => DEFAULT_LOCAL_DIMENSIONS,
        };
        Ok(Self::new(
            model_id,
            dimensions,
            config.batch_size.max(1),
            Some(fastembed_model),
            enable_runtime,
        ))
    }

    fn new(
        model_id: String,
        dimensions: usize,
        batch_size: usize,
        fastembed_model: Option<EmbeddingModel>,
        enable_runtime: bool,
    ) -> Self {
        Self {
            model_id,
            dimensions,
            batch_size,
            fastembed_model,
            enable_runtime,
            runtime: OnceLock::new(),
        }
    }

    /// The shared session, `Ok(None)` when the runtime is switched off.
    /// An initialization failure is remembered and reported on every call.
    fn runtime(&self) -> Result<Option<&SharedTextEmbedding>, ProviderError> {
        if !self.enable_runtime {
            return Ok(None);
        }
        self.runtime
            .get_or_init(|| {
                let model = self
                    .fastembed_model
                    .clone()
                    .ok_or_else(|| format!("no fastembed model for {}", self.model_id))?;
                FASTEMBED_RUNTIMES
                    .get_or_try_insert(self.model_id.clone(), || init_runtime(&self.model_id, model))
            })
            .as_ref()
            .map(Some)
            .map_err(|reason| ProviderError::runtime("local", reason))
    }
}

fn init_runtime(model_id: &str, model: EmbeddingModel) -> Result<SharedTextEmbedding, String> {
    let options = TextInitOptions::new(model).with_show_download_progress(false);
    TextEmbedding::try_new(options)
        .map(|runtime| Arc::new(Mutex::new(runtime)))
        .map_err(|err| {
            warn!(model = model_id, error = %err, "fastembed initialization failed");
            format!("fastembed init for {model_id}: {err}")
        })
}

impl EmbeddingProvider for FastEmbedProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn category(&self) -> ProviderCategory {
        ProviderCategory::Local
    }

    fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        // Hash vectors only when the runtime was switched off explicitly.
        let Some(runtime) = self.runtime()? else {
            return Ok(inputs
                .iter()
                .map(|input| deterministic_embedding(input, self.dimensions))
                .collect());
        };

        let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
        let vectors = runtime
            .lock()
            .map_err(|_| ProviderError::runtime("local", "embedding session poisoned"))?
            .embed(refs, Some(self.batch_size))
            .map_err(|err| ProviderError::runtime("local", err))?;

        if vectors.len() != inputs.len() || vectors.iter().any(|v| v.len() != self.dimensions) {
            return Err(ProviderError::invalid_response(
                "local",
                format!(
                    "unexpected embedding shape: {} vectors for {} inputs",
                    vectors.len(),
                    inputs.len()
                ),
            ));
        }
        Ok(vectors)
    }
}

fn parse_fastembed_model(model: &str) -> Option<EmbeddingModel> {
    match model.trim().to_ascii_lowercase().as_str() {
        "allminilml6v2" | "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bgesmallenv15" => Some(EmbeddingModel::BGESmallENV15),
        "bgebaseenv15" => Some(EmbeddingModel::BGEBaseENV15),
        "jinaembeddingsv2basecode" => Some(EmbeddingModel::JinaEmbeddingsV2BaseCode),
        "nomicembedtextv15" => Some(EmbeddingModel::NomicEmbedTextV15),
        _ => model.parse::<EmbeddingModel>().ok(),
    }
}

fn model_dimensions(model: &EmbeddingModel) -> Option<usize> {
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|entry| entry.model == *model)
        .map(|entry| entry.dim)
}

fn fastembed_runtime_enabled() -> bool {
    parse_runtime_flag(std::env::var("SCRY_ENABLE_FASTEMBED_RUNTIME").ok().as_deref())
}

fn parse_runtime_flag(raw: Option<&str>) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        None => true,
        Some(value) => !matches!(value.as_str(), "0" | "false" | "no" | "off"),
    }
}

/// Unit-length pseudo-random vector seeded from the input text.
fn deterministic_embedding(input: &str, dimensions: usize) -> Vec<f32> {
    if dimensions == 0 {
        return Vec::new();
    }
    let hash = blake3::hash(input.as_bytes());
    let mut seed = [0_u8; 8];
    seed.copy_from_slice(&hash.as_bytes()[..8]);
    let mut state = u64::from_le_bytes(seed);
    if state == 0 {
        state = 0x9e37_79b9_7f4a_7c15;
    }

    let mut vector: Vec<f64> = (0..dimensions)
        .map(|_| {
            // xorshift64*
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let n = state.wrapping_mul(0x2545_F491_4F6C_DD1D);
            (n as f64 / u64::MAX as f64) * 2.0 - 1.0
        })
        .collect();

    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector.into_iter().map(|v| v as f32).collect()
}

struct RemoteDefaults {
    base_url: &'static str,
    model: &'static str,
    dimensions: usize,
    api_key_env: &'static str,
}

fn remote_defaults(provider: &str) -> RemoteDefaults {
    match provider {
        "voyage" => RemoteDefaults {
            base_url: "https://api.voyageai.com/v1",
            model: "voyage-code-3",
            dimensions: 1024,
            api_key_env: "VOYAGE_API_KEY",
        },
        "siliconflow" => RemoteDefaults {
            base_url: "https://api.siliconflow.cn/v1",
            model: "BAAI/bge-m3",
            dimensions: 1024,
            api_key_env: "SILICONFLOW_API_KEY",
        },
        _ => RemoteDefaults {
            base_url: "https://api.openai.com/v1",
            model: "text-embedding-3-small",
            dimensions: 1536,
            api_key_env: "OPENAI_API_KEY",
        },
    }
}

/// OpenAI-compatible `/embeddings` client (OpenAI, Voyage, SiliconFlow).
pub struct ExternalEmbeddingProvider {
    provider: String,
    model_id: String,
    dimensions: usize,
    batch_size: usize,
    endpoint: String,
    api_key_env: String,
    client: Client,
}

impl ExternalEmbeddingProvider {
    pub fn from_config(
        provider: &str,
        config: &EmbeddingConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let defaults = remote_defaults(provider);
        let base_url = non_empty(config.base_url.as_deref()).unwrap_or(defaults.base_url);
        let timeout_ms = timeout.as_millis() as u64;
        let client = EMBEDDING_HTTP_CLIENTS.get_or_try_insert(timeout_ms, || {
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| ProviderError::transport(provider, err))
        })?;
        Ok(Self {
            provider: provider.to_string(),
            model_id: non_empty(config.model.as_deref())
                .unwrap_or(defaults.model)
                .to_string(),
            dimensions: config.dimensions.unwrap_or(defaults.dimensions),
            batch_size: config.batch_size.max(1),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key_env: non_empty(config.api_key_env.as_deref())
                .unwrap_or(defaults.api_key_env)
                .to_string(),
            client,
        })
    }

    fn payload(&self, chunk: &[String]) -> serde_json::Value {
        match self.provider.as_str() {
            "voyage" => serde_json::json!({
                "model": self.model_id,
                "input": chunk,
                "input_type": "document",
            }),
            "openai" if self.model_id.starts_with("text-embedding-3") => serde_json::json!({
                "model": self.model_id,
                "input": chunk,
                "dimensions": self.dimensions,
            }),
            _ => serde_json::json!({
                "model": self.model_id,
                "input": chunk,
            }),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl EmbeddingProvider for ExternalEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn category(&self) -> ProviderCategory {
        ProviderCategory::Remote
    }

    fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::missing_api_key(&self.provider, &self.api_key_env))?;

        let mut all_vectors = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(self.batch_size) {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&api_key)
                .header("content-type", "application/json")
                .json(&self.payload(chunk))
                .send()
                .map_err(|err| ProviderError::transport(&self.provider, err))?;
            if !response.status().is_success() {
                return Err(ProviderError::http(
                    &self.provider,
                    response.status().as_u16(),
                ));
            }
            let body: EmbeddingApiResponse = response
                .json()
                .map_err(|err| ProviderError::invalid_response(&self.provider, err.to_string()))?;
            let vectors = align_embeddings(body.data, chunk.len(), self.dimensions)
                .map_err(|reason| ProviderError::invalid_response(&self.provider, reason))?;
            all_vectors.extend(vectors);
        }
        Ok(all_vectors)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Order vectors by the response `index` when present, else by position.
fn align_embeddings(
    data: Vec<EmbeddingData>,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, String> {
    if let Some(bad) = data.iter().find(|item| item.embedding.len() != dimensions) {
        return Err(format!(
            "dimensions mismatch expected={dimensions} got={}",
            bad.embedding.len()
        ));
    }
    if data.len() != expected {
        return Err(format!(
            "result count mismatch expected={expected} got={}",
            data.len()
        ));
    }

    let indexed = data.iter().filter(|item| item.index.is_some()).count();
    if indexed == 0 {
        return Ok(data.into_iter().map(|item| item.embedding).collect());
    }
    if indexed != data.len() {
        return Err("index present on some items only".to_string());
    }

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in data {
        let index = item.index.unwrap_or(usize::MAX);
        let Some(slot) = ordered.get_mut(index) else {
            return Err(format!("index out of range index={index} expected={expected}"));
        };
        if slot.is_some() {
            return Err(format!("duplicate index {index}"));
        }
        *slot = Some(item.embedding);
    }
    ordered
        .into_iter()
        .enumerate()
        .map(|(index, vector)| vector.ok_or_else(|| format!("missing index {index}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::types::SymbolKind;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn bind_test_listener() -> Option<TcpListener> {
        match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => Some(listener),
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => None,
            Err(err) => panic!("mock server bind failed: {err}"),
        }
    }

    fn local_provider(dimensions: usize) -> FastEmbedProvider {
        FastEmbedProvider::new("test-model".to_string(), dimensions, 8, None, false)
    }

    fn data(index: Option<usize>, embedding: Vec<f32>) -> EmbeddingData {
        EmbeddingData { index, embedding }
    }

    #[test]
    fn deterministic_fallback_is_stable_and_unit_length() {
        let provider = local_provider(16);
        let first = provider
            .embed(&["alpha".to_string(), "beta".to_string(), "alpha".to_string()])
            .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert_eq!(provider.category(), ProviderCategory::Local);
    }

    #[test]
    fn local_defaults_to_minilm() {
        let provider = FastEmbedProvider::from_config(&EmbeddingConfig::default(), false).unwrap();
        assert_eq!(provider.model_id(), "AllMiniLML6V2");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn local_dimension_mismatch_is_rejected() {
        let config = EmbeddingConfig {
            dimensions: Some(768),
            ..EmbeddingConfig::default()
        };
        let Err(err) = FastEmbedProvider::from_config(&config, false) else {
            panic!("expected dimensions mismatch");
        };
        assert!(err.to_string().contains("dimensions mismatch"));
    }

    #[test]
    fn unknown_local_model_is_rejected() {
        let config = EmbeddingConfig {
            backend: "local".to_string(),
            model: Some("all-minilm-l12-typo".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            FastEmbedProvider::from_config(&config, true),
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            build_embedding_provider(&config),
            Err(ProviderError::Unsupported(_))
        ));
    }

    #[test]
    fn failed_runtime_reports_an_error_on_every_call() {
        let provider = FastEmbedProvider::new("test-model".to_string(), 4, 8, None, true);
        for _ in 0..2 {
            let err = provider.embed(&["query".to_string()]).unwrap_err();
            assert_eq!(err.reason_code(), "local_runtime_error");
        }
        assert!(provider.embed(&[]).unwrap().is_empty());
    }

    #[test]
    fn runtime_flag_defaults_to_enabled() {
        assert!(parse_runtime_flag(None));
        assert!(parse_runtime_flag(Some("1")));
        assert!(!parse_runtime_flag(Some("0")));
        assert!(!parse_runtime_flag(Some(" False ")));
    }

    #[test]
    fn factory_handles_none_and_unknown_backends() {
        let none = build_embedding_provider(&EmbeddingConfig::default()).unwrap();
        assert!(none.is_none());

        let config = EmbeddingConfig {
            backend: "quantum".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            build_embedding_provider(&config),
            Err(ProviderError::Unsupported(_))
        ));

        let config = EmbeddingConfig {
            backend: "voyage".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = build_embedding_provider(&config).unwrap().unwrap();
        assert_eq!(provider.model_id(), "voyage-code-3");
        assert_eq!(provider.category(), ProviderCategory::Remote);
    }

    #[test]
    fn missing_api_key_is_reported_before_any_request() {
        let config = EmbeddingConfig {
            api_key_env: Some("SCRY_TEST_EMBEDDING_KEY_THAT_IS_NEVER_SET".to_string()),
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..EmbeddingConfig::default()
        };
        let provider =
            ExternalEmbeddingProvider::from_config("openai", &config, Duration::from_millis(50))
                .unwrap();
        let err = provider.embed(&["x".to_string()]).unwrap_err();
        assert_eq!(err.reason_code(), "openai_missing_api_key");
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let aligned = align_embeddings(
            vec![data(Some(1), vec![2.0, 0.0]), data(Some(0), vec![1.0, 0.0])],
            2,
            2,
        )
        .unwrap();
        assert_eq!(aligned, vec![vec![1.0, 0.0], vec![2.0, 0.0]]);
    }

    #[test]
    fn alignment_rejects_malformed_responses() {
        let mixed = align_embeddings(
            vec![data(Some(0), vec![1.0]), data(None, vec![2.0])],
            2,
            1,
        );
        assert!(mixed.unwrap_err().contains("some items only"));

        let out_of_range = align_embeddings(vec![data(Some(3), vec![1.0])], 1, 1);
        assert!(out_of_range.unwrap_err().contains("out of range"));

        let wrong_dims = align_embeddings(vec![data(None, vec![1.0, 2.0])], 1, 3);
        assert!(wrong_dims.unwrap_err().contains("dimensions mismatch"));

        let short = align_embeddings(vec![data(None, vec![1.0])], 2, 1);
        assert!(short.unwrap_err().contains("count mismatch"));
    }

    #[test]
    fn symbol_text_joins_available_parts() {
        let symbol = Symbol {
            id: "s".to_string(),
            name: "parse".to_string(),
            qualified_name: "html.Parser.parse".to_string(),
            kind: SymbolKind::Method,
            language: "python".to_string(),
            file_path: "html.py".to_string(),
            line_start: 1,
            line_end: 2,
            signature: Some("def parse(self, data)".to_string()),
            doc_comment: None,
            body_text: Some("return data".to_string()),
        };
        assert_eq!(
            symbol_embedding_text(&symbol),
            "html.Parser.parse def parse(self, data) return data"
        );
    }

    #[test]
    fn chunk_text_is_truncated_on_char_boundary() {
        let chunk = ChunkForEmbedding {
            id: "c".to_string(),
            file_path: "a.py".to_string(),
            context_path: "A > f".to_string(),
            content: "é".repeat(MAX_EMBEDDING_TEXT_CHARS + 10),
        };
        let text = chunk_embedding_text(&chunk);
        assert!(text.starts_with("file: a.py\ncontext: A > f\n"));
        assert_eq!(
            text.chars().count(),
            "file: a.py\ncontext: A > f\n".chars().count() + MAX_EMBEDDING_TEXT_CHARS
        );
    }

    #[test]
    fn integration_mock_openai_endpoint_returns_vectors() {
        let Some(listener) = bind_test_listener() else {
            return;
        };
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("mock server accept failed");
            stream
                .set_read_timeout(Some(Duration::from_millis(300)))
                .unwrap();
            let mut request_buf = [0_u8; 4096];
            let _ = stream.read(&mut request_buf);
            let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream
                .write_all(response.as_bytes())
                .expect("mock server write failed");
        });

        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("SCRY_TEST_EMBEDDING_MOCK_KEY", "test-key") };
        let config = EmbeddingConfig {
            base_url: Some(format!("http://{addr}")),
            api_key_env: Some("SCRY_TEST_EMBEDDING_MOCK_KEY".to_string()),
            model: Some("custom-embed".to_string()),
            dimensions: Some(2),
            ..EmbeddingConfig::default()
        };
        let provider =
            ExternalEmbeddingProvider::from_config("openai", &config, Duration::from_secs(2))
                .unwrap();
        let vectors = provider
            .embed(&["first".to_string(), "second".to_string()])
            .unwrap();
        server.join().unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
