use thiserror::Error;

/// Failure reported by a query store.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum QueryError {
    /// A value filter was chained without a preceding `property(..)`.
    #[error("'{filter}' needs a property selected first")]
    MissingProperty { filter: &'static str },
    #[error("'{0}' is not an integer")]
    InvalidInteger(String),
    #[error("unknown {kind} operator '{operator}'")]
    UnknownOperator { kind: &'static str, operator: String },
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("query store failed")]
    Store(#[source] StoreError),
}

impl QueryError {
    pub(crate) fn unknown(kind: &'static str, operator: &str) -> Self {
        QueryError::UnknownOperator {
            kind,
            operator: operator.to_string(),
        }
    }
}
