//! # serverlist-sync
//!
//! Membership synchronization against an optimistic-concurrency store.
//!
//! Build a [`SyncEngine`] over any [`RemoteStore`] and [`AddressResolver`] and
//! call [`SyncEngine::run`]; it loops read → upsert → prune → write → verify
//! rounds until this host's entry is verifiably fresh in the shared record.

pub mod clock;
pub mod engine;
pub mod error;
pub mod identity;
pub mod keys;
pub mod retry;
pub mod skyd;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use engine::{fetch_list, SyncEngine, SyncOptions, SyncReport, VerifyMode};
pub use error::{RoundError, StoreError, SyncError, VerificationFailure};
pub use identity::{AddressResolver, HttpAddressResolver, StaticAddress};
pub use keys::StoreKeys;
pub use retry::{Backoff, RetryPolicy};
pub use skyd::SkydStore;
pub use store::{DataKey, MemoryStore, RemoteStore, StoreRecord};
