/// Convenience result type used across mapanim.
pub type MapAnimResult<T> = Result<T, MapAnimError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// Failures of individual render or composite requests are not errors at this level: they are
/// isolated to one cache key and surface as missing or placeholder bitmaps.
#[derive(thiserror::Error, Debug)]
pub enum MapAnimError {
    /// Invalid user-provided commands, options or sizes.
    #[error("validation error: {0}")]
    Validation(String),

    /// An external rendering collaborator failed where the caller needs its output.
    #[error("render error: {0}")]
    Render(String),

    /// Cache consistency violation (releasing an untracked key, refcount underflow).
    #[error("cache error: {0}")]
    Cache(String),

    /// Errors when serializing or deserializing plans and options.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MapAnimError {
    /// Build a [`MapAnimError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`MapAnimError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`MapAnimError::Cache`] value.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Build a [`MapAnimError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
