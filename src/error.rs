use thiserror::Error;

/// Errors a caller of the impact model or the exposure aggregator can see.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImpactError {
    #[error("invalid impact parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid exposure query: {0}")]
    InvalidQuery(String),
}

/// Failure of a single population provider call.
///
/// These never reach the caller of the aggregator; they are logged and turned
/// into "no data from this provider".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("{provider} unavailable: {reason}")]
    Unavailable {
        provider: &'static str,
        reason: String,
    },
    #[error("{provider} returned a bad response: {reason}")]
    BadResponse {
        provider: &'static str,
        reason: String,
    },
}

impl ProviderError {
    pub fn unavailable(provider: &'static str, reason: impl Into<String>) -> Self {
        ProviderError::Unavailable {
            provider,
            reason: reason.into(),
        }
    }

    pub fn bad_response(provider: &'static str, reason: impl Into<String>) -> Self {
        ProviderError::BadResponse {
            provider,
            reason: reason.into(),
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Unavailable { provider, .. } => provider,
            ProviderError::BadResponse { provider, .. } => provider,
        }
    }
}
