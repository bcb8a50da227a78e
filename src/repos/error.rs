/**
 * Responsibility
 * - What a store reports upward (not found / conflict / backend failure)
 */
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("entity not found")]
    NotFound,

    #[error("entity already exists")]
    Conflict,

    #[error("store backend error: {0}")]
    Backend(String),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::NotFound => ErrorKind::NotFound,
            RepoError::Conflict => ErrorKind::Conflict,
            RepoError::Backend(_) => ErrorKind::Internal,
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
