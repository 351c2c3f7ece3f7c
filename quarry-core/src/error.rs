use crate::Value;
use std::error::Error as StdError;
use thiserror::Error;

/// Failure kinds surfaced by descriptors, the compiler and the execution engine.
///
/// Every public operation returns [`crate::Result`], an [`anyhow::Error`] wrapping one of these
/// variants when the failure originates here. Inspect it with `error.downcast_ref::<QuarryError>()`.
#[derive(Debug, Error)]
pub enum QuarryError {
    #[error("Entity `{0}` is not registered")]
    UnknownEntity(String),
    #[error("Illegal query shape: {0}")]
    QueryShape(String),
    #[error("Paging requires an ordering and `{0}` has no primary key to order by")]
    PagingRequiresOrder(String),
    #[error("Cannot compile the query: {0}")]
    Compilation(String),
    #[error("{message}\nSQL: {sql}")]
    Execution {
        message: String,
        sql: String,
        params: Vec<Value>,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    },
    #[error("Cannot map the result: {0}")]
    Mapping(String),
}

impl QuarryError {
    pub fn shape(message: impl Into<String>) -> crate::Error {
        QuarryError::QueryShape(message.into()).into()
    }
    pub fn compilation(message: impl Into<String>) -> crate::Error {
        QuarryError::Compilation(message.into()).into()
    }
    pub fn mapping(message: impl Into<String>) -> crate::Error {
        QuarryError::Mapping(message.into()).into()
    }
    /// Wrap a driver failure together with the statement that produced it.
    pub fn execution(error: crate::Error, sql: &str, params: &[Value]) -> crate::Error {
        QuarryError::Execution {
            message: format!("{:#}", error),
            sql: sql.to_string(),
            params: params.to_vec(),
            source: Some(error.into()),
        }
        .into()
    }
}

/// Returns the error kind when the error was produced by this crate.
pub fn error_kind(error: &crate::Error) -> Option<&QuarryError> {
    error.downcast_ref::<QuarryError>()
}
