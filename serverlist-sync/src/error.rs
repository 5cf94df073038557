//! Error types for serverlist-sync.
//!
//! Everything below [`SyncError`] is a per-round failure: the engine logs it
//! and retries after a backoff. Only [`SyncError`] reaches the caller.

use thiserror::Error;

use serverlist_core::{CodecError, Revision};

/// Failures talking to the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key has never been written.
    #[error("registry entry not found")]
    NotFound,

    /// The store refused the write because its revision moved on.
    #[error("write at revision {revision} rejected by the store")]
    Conflict { revision: Revision },

    #[error("transport error talking to {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("unexpected HTTP status {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed store response: {0}")]
    Malformed(String),
}

/// Why the post-write read did not show our entry.
#[derive(Debug, Error)]
pub enum VerificationFailure {
    #[error("verification read failed: {0}")]
    Read(#[source] StoreError),

    #[error("verification payload undecodable: {0}")]
    Decode(#[source] CodecError),

    #[error("own entry missing from the list")]
    Missing,

    #[error("own entry is {age_secs}s old")]
    Stale { age_secs: u64 },

    /// Strict mode only: the entry is fresh but not the one this round wrote.
    #[error("own entry differs from the one just written")]
    Mismatch,
}

/// One failed round.
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("failed to read server list: {0}")]
    Read(#[source] StoreError),

    #[error("failed to decode server list: {0}")]
    Decode(#[source] CodecError),

    #[error("failed to encode server list: {0}")]
    Encode(#[source] CodecError),

    #[error("failed to write server list: {0}")]
    Write(#[source] StoreError),

    #[error("success check failed: {0}")]
    Verify(#[source] VerificationFailure),
}

/// Fatal outcome of [`crate::SyncEngine::run`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("gave up after {rounds} round(s); last error: {last}")]
    RetriesExhausted { rounds: u32, last: RoundError },

    #[error("deadline of {deadline_secs}s passed after {rounds} round(s); last error: {last}")]
    DeadlineExceeded {
        rounds: u32,
        deadline_secs: u64,
        last: RoundError,
    },
}
