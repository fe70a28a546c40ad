//! Read-only JSON query API (spec.md §6 "External interfaces — RPC").
//! Out of the core replication scope but specified as the interface other
//! processes read indexed state through; kept intentionally thin.

pub mod server;

use thiserror::Error;

/// Maps 1:1 onto `NodeError::Api` (spec.md §7 "User/API" error kind):
/// invalid query shape or an unknown method both surface as JSON-RPC
/// `-32602` (Invalid params), regardless of HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] crate::store::StoreError),
}

impl ApiError {
    pub fn code(&self) -> i32 {
        match self {
            ApiError::UnknownMethod(_) | ApiError::InvalidParams(_) => -32602,
            ApiError::NotFound => -32000,
            ApiError::Storage(_) => -32001,
        }
    }
}

pub use server::{run_server, AppState};
