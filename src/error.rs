use thiserror::Error;
use uuid::Uuid;

use crate::models::ModelScope;

/// Recoverable failures surfaced to the caller. Nothing in the core panics
/// on caller-supplied data.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient training data for {scope}: {actual} terminal applications, {required} required")]
    InsufficientData {
        scope: ModelScope,
        actual: usize,
        required: usize,
    },

    #[error("no active model for scholarship {scholarship_id} and no global fallback; train a global model first")]
    ModelUnavailable { scholarship_id: Uuid },
}
