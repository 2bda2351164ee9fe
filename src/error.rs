use thiserror::Error;

/// Failure taxonomy for the sync pipeline and the place store.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Network failure or non-success HTTP status from the Overpass
    /// endpoint. Never retried internally.
    #[error("overpass request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The response body was not well-formed Overpass JSON.
    #[error("overpass response could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("text index failure: {0}")]
    Search(#[from] tantivy::TantivyError),

    /// A record that cannot be written, e.g. an empty source id.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, Error>;
