use thiserror::Error;

/// Errors surfaced by the provider core.
///
/// Every failure a provider can produce is normalized to one of these kinds
/// so callers can branch without knowing which backend was involved. The
/// original provider code and message are preserved in `message` for logging.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Server unavailable: {message}")]
    ServerUnavailable { message: String },

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        /// Wait hint in seconds, taken from the provider when supplied.
        retry_after: Option<u64>,
    },

    #[error("Authorization error: {message}")]
    Authorization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Provider not found: {id}")]
    UnknownProvider { id: String },
}

impl ProviderError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn server_unavailable(message: impl Into<String>) -> Self {
        Self::ServerUnavailable {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unknown_provider(id: impl Into<String>) -> Self {
        Self::UnknownProvider { id: id.into() }
    }

    /// Whether the retry policy may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ServerUnavailable { .. } | Self::RateLimit { .. }
        )
    }

    /// Provider-supplied wait hint in seconds, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection_error",
            Self::ServerUnavailable { .. } => "server_unavailable",
            Self::RateLimit { .. } => "rate_limit",
            Self::Authorization { .. } => "authorization_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Parse { .. } => "parse_error",
            Self::Validation { .. } => "validation_error",
            Self::UnknownProvider { .. } => "provider_not_found",
        }
    }
}
