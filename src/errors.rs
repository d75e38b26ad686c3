use thiserror::Error;

/// A raw leg row that could not become a `LegRecord`. The row is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("row {row}: {field}: {reason}")]
pub struct IngestionError {
    pub row: usize,
    pub field: &'static str,
    pub reason: String,
}

impl IngestionError {
    pub fn missing(row: usize, field: &'static str) -> Self {
        Self {
            row,
            field,
            reason: "missing required value".to_string(),
        }
    }

    pub fn invalid(row: usize, field: &'static str, value: &str) -> Self {
        Self {
            row,
            field,
            reason: format!("unrecognized value {value:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("http {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache entry is corrupt: {0}")]
    Corrupt(String),

    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SeasonError {
    #[error("no usable leg records ({rejected} rows rejected)")]
    NoUsableRecords { rejected: usize },
}
