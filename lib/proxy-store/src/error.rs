use thiserror::Error;

use crate::Revision;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid key: {field} must not be empty")]
    InvalidKey { field: &'static str },

    #[error("Invalid visibility for service {0}: at least one source is required")]
    InvalidVisibility(String),

    #[error("Timed out waiting for revision {requested} (current: {current})")]
    ViewTimeout { requested: Revision, current: Revision },

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
