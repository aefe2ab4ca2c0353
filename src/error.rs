use thiserror::Error;

/// Errors from the upstream listing/profile API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("login rejected: {0}")]
    Auth(String),
}

/// Errors from a single webhook delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl DeliveryError {
    /// The webhook refused this payload and will refuse it again.
    /// Network errors, 5xx and 429 are worth another try.
    pub fn is_permanent(&self) -> bool {
        match self {
            DeliveryError::Http(_) => false,
            DeliveryError::Status { status, .. } => (400..500).contains(status) && *status != 429,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} not supplied, use --help for info")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
