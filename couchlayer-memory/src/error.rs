//! Failures raised by the in-memory store.

use couchlayer_core::error::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("Document {0} is missing")]
    Missing(String),

    #[error("Document {0} was deleted")]
    Deleted(String),

    #[error("Document update conflict.")]
    Conflict,

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("View {0} is not defined")]
    MissingView(String),

    #[error("{0}")]
    BadRequest(String),
}

impl From<MemoryStoreError> for StoreError {
    fn from(err: MemoryStoreError) -> Self {
        let reason = err.to_string();
        match err {
            MemoryStoreError::Missing(_) | MemoryStoreError::MissingView(_) => {
                StoreError::not_found(reason)
            }
            MemoryStoreError::Deleted(_) => StoreError::not_found("deleted"),
            MemoryStoreError::Conflict => StoreError::conflict(reason),
            MemoryStoreError::InvalidOperator(_) => {
                StoreError::new("invalid_operator", reason).with_status(400)
            }
            MemoryStoreError::BadRequest(_) => StoreError::bad_request(reason),
        }
    }
}
