//! Store error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown consent category: {0}")]
    UnknownCategory(String),
}
