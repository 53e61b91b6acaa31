use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: &'static str, reason: String },

    #[error("history store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("probe to {target} timed out after {}ms", timeout.as_millis())]
    ProbeTimeout { target: String, timeout: Duration },

    #[error("probe to {target} failed: {reason}")]
    ProbeTransport { target: String, reason: String },

    #[error("measurement cancelled")]
    Cancelled,

    #[error("address detection timed out after {}ms", .0.as_millis())]
    DetectionTimeout(Duration),

    #[error("invalid measurement transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Error::StoreUnavailable(err.to_string())
    }

    /// True for failures that mean "no measurement", as opposed to a genuine zero.
    pub fn is_probe_failure(&self) -> bool {
        matches!(self, Error::ProbeTimeout { .. } | Error::ProbeTransport { .. })
    }
}
