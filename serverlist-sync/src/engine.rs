//! The membership sync loop.
//!
//! One round:
//! 1. read the record (never-written key → empty list at revision 0)
//! 2. decode, upsert our own entry, prune entries past the retention window
//! 3. write at `revision + 1`
//! 4. settle pause, then re-read and check our entry is present and fresh
//!
//! Any failure inside a round is logged and retried after a jittered backoff.
//! A write can "succeed" from our side and still lose to a concurrent writer;
//! the verification read is what detects that.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serverlist_core::{
    codec,
    membership::{age, RETENTION_WINDOW, VERIFY_WINDOW},
    AddressLookup, MemberEntry, MembershipList, Revision, ServerName,
};

use crate::clock::Clock;
use crate::error::{RoundError, StoreError, SyncError, VerificationFailure};
use crate::identity::AddressResolver;
use crate::retry::{Backoff, RetryPolicy};
use crate::store::{DataKey, RemoteStore};

/// How strictly the verification read is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// Our entry exists and is within the freshness window.
    #[default]
    Fresh,
    /// As `Fresh`, and the entry equals the one this round wrote.
    Exact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub retry: RetryPolicy,
    pub retention: Duration,
    pub verify_window: Duration,
    pub verify: VerifyMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            retention: RETENTION_WINDOW,
            verify_window: VERIFY_WINDOW,
            verify: VerifyMode::default(),
        }
    }
}

/// Outcome of a successful [`SyncEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Rounds used, including the successful one.
    pub rounds: u32,
    /// Revision our accepted write carried.
    pub revision: Revision,
    /// Our entry as seen by the verification read.
    pub entry: MemberEntry,
    /// Members on the list we wrote.
    pub members: usize,
    /// Entries dropped by the pruning pass of the successful round.
    pub pruned: Vec<MemberEntry>,
}

pub struct SyncEngine<'a, S: ?Sized, R: ?Sized, C> {
    store: &'a S,
    resolver: &'a R,
    clock: C,
    key: DataKey,
    name: ServerName,
    options: SyncOptions,
    backoff: Backoff,
}

impl<'a, S, R, C> SyncEngine<'a, S, R, C>
where
    S: RemoteStore + ?Sized,
    R: AddressResolver + ?Sized,
    C: Clock,
{
    pub fn new(
        store: &'a S,
        resolver: &'a R,
        clock: C,
        key: DataKey,
        name: ServerName,
        options: SyncOptions,
    ) -> Self {
        let backoff = Backoff::new(options.retry.max_backoff);
        Self {
            store,
            resolver,
            clock,
            key,
            name,
            options,
            backoff,
        }
    }

    /// Replace the entropy-seeded backoff, e.g. with [`Backoff::seeded`].
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run rounds until our entry is verifiably fresh or the retry budget
    /// runs out.
    pub fn run(&mut self) -> Result<SyncReport, SyncError> {
        let started = self.clock.now();
        let mut round = 0u32;
        loop {
            round = round.saturating_add(1);
            let err = match self.run_round(round) {
                Ok(mut report) => {
                    report.rounds = round;
                    tracing::info!(
                        round,
                        revision = %report.revision,
                        members = report.members,
                        "server list updated",
                    );
                    return Ok(report);
                }
                Err(err) => err,
            };

            tracing::warn!(round, error = %err, "update round failed");

            if self.options.retry.rounds_exhausted(round) {
                return Err(SyncError::RetriesExhausted {
                    rounds: round,
                    last: err,
                });
            }
            if let Some(deadline) = self.deadline_passed(started) {
                return Err(SyncError::DeadlineExceeded {
                    rounds: round,
                    deadline_secs: deadline.as_secs(),
                    last: err,
                });
            }

            let mut delay = self.backoff.next_delay();
            if let Some(remaining) = self.options.retry.remaining(self.elapsed_since(started)) {
                delay = delay.min(remaining);
            }
            tracing::info!(
                round,
                delay_secs = delay.as_secs(),
                "update was unsuccessful, backing off",
            );
            self.clock.sleep(delay);

            // A backoff cut short by the deadline does not earn another round.
            if let Some(deadline) = self.deadline_passed(started) {
                return Err(SyncError::DeadlineExceeded {
                    rounds: round,
                    deadline_secs: deadline.as_secs(),
                    last: err,
                });
            }
        }
    }

    fn elapsed_since(&self, started: DateTime<Utc>) -> Duration {
        self.clock
            .now()
            .signed_duration_since(started)
            .to_std()
            .unwrap_or_default()
    }

    /// The configured deadline, once it has passed.
    fn deadline_passed(&self, started: DateTime<Utc>) -> Option<Duration> {
        let retry = &self.options.retry;
        retry
            .deadline
            .filter(|_| retry.deadline_passed(self.elapsed_since(started)))
    }

    /// One read → upsert → prune → write → verify attempt.
    ///
    /// `report.rounds` is left at zero; [`SyncEngine::run`] fills it in.
    pub fn run_round(&mut self, round: u32) -> Result<SyncReport, RoundError> {
        let (mut list, revision) = fetch_list(self.store, &self.key)?;
        tracing::debug!(round, revision = %revision, members = list.len(), "fetched server list");

        let address = self.resolver.resolve();
        if let AddressLookup::Unavailable(reason) = &address {
            tracing::info!(reason = %reason, "own address unavailable, keeping stored address");
        }

        let now = self.clock.now();
        let written = list.upsert_self(&self.name, &address, now);
        let pruned = list.prune_stale(self.options.retention, now);
        for entry in &pruned {
            tracing::info!(
                name = %entry.name,
                last_seen = %entry.last_seen,
                "pruning stale server",
            );
        }

        let payload = codec::encode(&list).map_err(RoundError::Encode)?;
        let target = revision.next();
        self.store
            .write(&self.key, &payload, target)
            .map_err(RoundError::Write)?;
        tracing::debug!(round, revision = %target, members = list.len(), "wrote server list");

        self.clock.sleep(self.options.retry.settle);

        let entry = self.verify(&written).map_err(RoundError::Verify)?;
        Ok(SyncReport {
            rounds: 0,
            revision: target,
            entry,
            members: list.len(),
            pruned,
        })
    }

    fn verify(&self, written: &MemberEntry) -> Result<MemberEntry, VerificationFailure> {
        let list = match self.store.read(&self.key) {
            Ok(record) => codec::decode(&record.data).map_err(VerificationFailure::Decode)?,
            Err(StoreError::NotFound) => return Err(VerificationFailure::Missing),
            Err(err) => return Err(VerificationFailure::Read(err)),
        };
        let entry = list
            .find(&self.name)
            .cloned()
            .ok_or(VerificationFailure::Missing)?;

        let entry_age = age(&entry, self.clock.now());
        if entry_age > self.options.verify_window {
            return Err(VerificationFailure::Stale {
                age_secs: entry_age.as_secs(),
            });
        }
        if self.options.verify == VerifyMode::Exact && &entry != written {
            return Err(VerificationFailure::Mismatch);
        }
        Ok(entry)
    }
}

/// Read and decode the current list. A never-written key is an empty list at
/// [`Revision::ZERO`].
pub fn fetch_list<S>(store: &S, key: &DataKey) -> Result<(MembershipList, Revision), RoundError>
where
    S: RemoteStore + ?Sized,
{
    match store.read(key) {
        Ok(record) => {
            let list = codec::decode(&record.data).map_err(RoundError::Decode)?;
            Ok((list, record.revision))
        }
        Err(StoreError::NotFound) => Ok((MembershipList::new(), Revision::ZERO)),
        Err(err) => Err(RoundError::Read(err)),
    }
}
