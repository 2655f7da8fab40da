//! Error types for the progression engine.

use crate::model::Stage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressError {
    /// Transient persistence failure; safe to retry on the next trigger
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Programmer error: the key is not in the achievement catalog
    #[error("unknown achievement key: {0}")]
    UnknownAchievement(String),

    /// No level achievement exists for this (stage, level) pair
    #[error("no achievement for {stage} level {level}")]
    CatalogGap { stage: Stage, level: u8 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProgressError {
    /// Whether retrying on the next trigger can reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ProgressError::Storage(_) | ProgressError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ProgressError>;
