//! Typed error conditions
//!
//! Functions return `anyhow::Result`; these types are the conditions a
//! caller may want to match on, recovered with `err.downcast_ref::<T>()`.

/// A push payload could not be decoded into an envelope
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Push body is not valid JSON: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    #[error("Push data is not valid base64")]
    InvalidBase64,

    #[error("Push data is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Push data is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Push data is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Push data has invalid historyId: {0}")]
    InvalidHistoryId(String),
}

/// Caller configuration is unusable
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("withLabel and withoutLabel should not have the same label: {}", .0.join(", "))]
    OverlappingLabels(Vec<String>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The remote service reported that a message does not exist
#[derive(Debug, thiserror::Error)]
#[error("Requested entity was not found: {0}")]
pub struct NotFoundError(pub String);

/// Error indicating the history ID has expired
///
/// Gmail only keeps history for a limited time; a start cursor older than
/// that is rejected and the mailbox has to be re-baselined.
#[derive(Debug, thiserror::Error)]
#[error("History ID expired or invalid")]
pub struct HistoryExpiredError;
