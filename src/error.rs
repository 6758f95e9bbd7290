//! Error types for the query engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A schema or table name failed validation. Only reachable through
    /// misconfiguration, never through request input.
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// All pool connections were busy for the whole acquire timeout.
    #[error("database connection pool exhausted")]
    PoolExhausted,

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl Error {
    /// Whether the caller can reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PoolExhausted)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            other => Error::Query(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_retryable() {
        let err = Error::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, Error::PoolExhausted));
        assert!(err.is_retryable());
    }

    #[test]
    fn row_not_found_is_a_query_failure() {
        let err = Error::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Query(_)));
        assert!(!err.is_retryable());
    }
}
