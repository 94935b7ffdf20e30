//! Cluster store errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster object store.
///
/// Callers branch on the kind: `NotFound` drives create-if-absent upserts,
/// `Conflict` drives re-fetch-and-recompute retries, and `Timeout` covers
/// cancellation and deadline expiry of an in-flight call. Everything else is
/// an `Api` error and retries with backoff.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency precondition failed; re-fetch and recompute
    #[error("conflict: {0}")]
    Conflict(String),

    /// The call was cancelled or its deadline expired
    #[error("timed out: {0}")]
    Timeout(String),

    /// Any other cluster API failure
    #[error("cluster API error: {0}")]
    Api(String),
}

impl StoreError {
    /// True for the not-found error kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// True for the optimistic-concurrency conflict kind.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Map a kube client error onto the store taxonomy.
pub(crate) fn from_kube(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(ae.message),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(ae.message),
        kube::Error::Api(ae) if ae.code == 408 || ae.code == 504 => StoreError::Timeout(ae.message),
        other => StoreError::Api(other.to_string()),
    }
}
