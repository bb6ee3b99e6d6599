use thiserror::Error;

/// A convenience `Result` alias using [`HandoffError`].
pub type HandoffResult<T> = Result<T, HandoffError>;

/// Top-level error type for the chat hub.
///
/// Each variant corresponds to a subsystem that can produce errors. Guard
/// rejections (e.g. a takeover on a session a human already handles) are
/// *not* errors; they are reported through `Transition` values.
#[derive(Error, Debug)]
pub enum HandoffError {
    /// Session lookup, state or history failure.
    #[error("Session error: {0}")]
    Session(String),

    /// The query engine could not produce a response.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The human-handling collaborator failed during a transfer.
    #[error("Handoff error: {0}")]
    Handoff(String),

    /// Transport or routing failure in the gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Invalid or missing configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// An outbound HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
