use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures crossing the boundary into the indexing core.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("core transport error: {0}")]
    Transport(String),

    #[error("core returned http {status} for {operation}")]
    Http { operation: String, status: u16 },

    #[error("failed to decode core response: {0}")]
    Decode(String),

    #[error("core error: {0}")]
    Core(String),

    #[error("invalid core request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Use with `.map_err(GatewayError::transport)`.
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::Transport(e.to_string())
    }

    pub fn decode<E: std::fmt::Display>(e: E) -> Self {
        Self::Decode(e.to_string())
    }

    pub fn core<E: std::fmt::Display>(e: E) -> Self {
        Self::Core(e.to_string())
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    pub fn http(operation: impl Into<String>, status: u16) -> Self {
        Self::Http {
            operation: operation.into(),
            status,
        }
    }
}

/// Transient failures of embedding, reranking, weighting and expansion providers.
///
/// Messages carry provider names and status codes only; request headers and
/// keys are never formatted into them.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider}: missing api key (set {env_var})")]
    MissingApiKey { provider: String, env_var: String },

    #[error("{provider}: transport error: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider}: http {status}")]
    Http { provider: String, status: u16 },

    #[error("{provider}: invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("{provider}: runtime error: {reason}")]
    Runtime { provider: String, reason: String },

    #[error("unsupported backend: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn missing_api_key(provider: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self::MissingApiKey {
            provider: provider.into(),
            env_var: env_var.into(),
        }
    }

    pub fn transport<E: std::fmt::Display>(provider: impl Into<String>, e: E) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: e.to_string(),
        }
    }

    pub fn http(provider: impl Into<String>, status: u16) -> Self {
        Self::Http {
            provider: provider.into(),
            status,
        }
    }

    pub fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn runtime<E: std::fmt::Display>(provider: impl Into<String>, e: E) -> Self {
        Self::Runtime {
            provider: provider.into(),
            reason: e.to_string(),
        }
    }

    /// Short, log-safe reason code such as `cohere_http_error`.
    pub fn reason_code(&self) -> String {
        match self {
            Self::MissingApiKey { provider, .. } => format!("{provider}_missing_api_key"),
            Self::Transport { provider, message } => {
                let lower = message.to_ascii_lowercase();
                if lower.contains("timed out") || lower.contains("timeout") {
                    format!("{provider}_timeout")
                } else {
                    format!("{provider}_transport_error")
                }
            }
            Self::Http { provider, .. } => format!("{provider}_http_error"),
            Self::InvalidResponse { provider, .. } => format!("{provider}_invalid_response"),
            Self::Runtime { provider, .. } => format!("{provider}_runtime_error"),
            Self::Unsupported(_) => "unsupported_backend".to_string(),
        }
    }
}

/// Index build or update failed. The core's last committed state stays authoritative.
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("indexing failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("no embedding provider configured")]
    NoEmbeddingProvider,

    #[error("embedding cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("path outside project root: {path}")]
    PathOutsideRoot { path: String },

    #[error("search failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("query embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SearchError {
    pub fn path_outside_root(path: impl Into<String>) -> Self {
        Self::PathOutsideRoot { path: path.into() }
    }
}

/// Engine construction failed before any query ran.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("invalid project root {path}: {reason}")]
    ProjectRoot { path: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("core client setup failed: {0}")]
    Gateway(#[from] GatewayError),
}
