use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 100] (got {rate})")]
    ErrorRateOutOfRange { name: &'static str, rate: f64 },
    #[error("flag_key must not be empty")]
    EmptyFlagKey,
    #[error("remote flag mode requires flags.remote_url")]
    MissingRemoteUrl,
}

/// Failure to obtain a variation from the flag service.
///
/// Callers fail open to the configured default variation.
#[derive(Debug, Error)]
pub enum FlagEvaluationError {
    #[error("flag service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("flag service returned status {0}")]
    Status(u16),
    #[error("flag service returned a malformed body: {0}")]
    Malformed(String),
}

/// Failures on the traffic generator's fetch/decode path.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response body: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Network(value.to_string())
    }
}
