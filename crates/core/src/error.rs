/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Preset or frame payload could not be decoded.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// A preset carried a value outside of the documented range.
    #[error("setting `{field}` = {value} is outside [{min}, {max}]")]
    InvalidSetting {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// A shape was built with a vertex count outside `3..=10`.
    #[error("shapes need between 3 and 10 vertices, got {0}")]
    InvalidVertexCount(u8),
    /// The draw target cannot accept strokes right now (e.g. a zero-sized
    /// canvas). Only the current frame is abandoned.
    #[error("draw surface is unavailable")]
    SurfaceUnavailable,
    /// The engine worker has already shut down.
    #[error("visualiser engine is not running")]
    EngineStopped,
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for VisualiserError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
