// src/error.rs

use actix_web::HttpResponse;
use thiserror::Error;

/// Failure taxonomy shared by the assignment engine, the workload
/// aggregator and the ledger. Store-level failures are folded into
/// `WriteFailed`/`Store`; version-guard rejections surface as
/// `ConcurrentOverwrite` so callers can retry with fresh state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("concurrent overwrite: {0}")]
    ConcurrentOverwrite(String),

    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn to_response(&self) -> HttpResponse {
        match self {
            EngineError::NotFound(_) => HttpResponse::NotFound().body(self.to_string()),
            EngineError::Invalid(_) => HttpResponse::BadRequest().body(self.to_string()),
            EngineError::ConcurrentOverwrite(_) => HttpResponse::Conflict().body(self.to_string()),
            EngineError::WriteFailed(_) | EngineError::Store(_) => {
                HttpResponse::InternalServerError().body(self.to_string())
            }
        }
    }
}
