use thiserror::Error;

/// The error-kind taxonomy of spec.md §7. Each variant documents its own
/// propagation/recovery rule; see the module that raises it for where that
/// rule is actually enforced (recovery is a control-flow decision made by
/// the caller, not by this enum).
#[derive(Debug, Error)]
pub enum NodeError {
    /// Timeout, connection refused, non-200 — recovered by peer
    /// reassignment in the peer pool; only surfaced once every eligible
    /// peer has failed a segment.
    #[error("transport error talking to {peer}: {message}")]
    Transport { peer: String, message: String },

    /// Unparseable JSON, wrong field, count/height mismatch — fatal to the
    /// affected round; caches are cleared and the round retries with a
    /// fresh peer sample.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Producer-signature verification failed — fatal to the specific
    /// block and the round; a repeated failure means a forked or
    /// tampered upstream.
    #[error("signature verification failed for block {hash}")]
    Signature { hash: String },

    /// Write-batch failure — fatal to the worker and the process; the
    /// watermark-advances-only-on-commit invariant must hold.
    #[error("storage error: {0}")]
    Storage(#[from] crate::store::StoreError),

    /// Invalid query / unknown method at the API boundary.
    #[error("api error ({code}): {message}")]
    Api { code: i32, message: String },

    #[error(transparent)]
    Common(#[from] chain_common::CommonError),
}

pub type NodeResult<T> = Result<T, NodeError>;
