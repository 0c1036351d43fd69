use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavigatorError {
    #[error("store error: {0}")]
    Store(#[from] storage::StoreError),
    #[error("invalid tag pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid folder pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NavigatorError>;
