//! Backend implementations for state storage

mod local;

pub use local::LocalBackend;

use keel_core::parser::BackendConfig;

use crate::backend::{BackendError, BackendResult, StateBackend};

/// Create the backend named by a `backend` block, a local file when there is none
pub fn create_backend(config: Option<&BackendConfig>) -> BackendResult<Box<dyn StateBackend>> {
    let Some(config) = config else {
        return Ok(Box::new(LocalBackend::default()));
    };
    match config.backend_type.as_str() {
        "local" => Ok(Box::new(LocalBackend::from_config(config))),
        other => Err(BackendError::UnsupportedBackend(other.to_string())),
    }
}
