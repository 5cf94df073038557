//! The membership list and the rules each round applies to it.
//!
//! The list is a set keyed by [`ServerName`] stored as a sequence. Rounds only
//! ever touch their own entry directly; other hosts' entries disappear solely
//! through age-based pruning.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AddressLookup, MemberEntry, ServerName};

/// Entries not refreshed for this long are dropped on the next write.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// An own entry older than this after a write means the write did not stick.
pub const VERIFY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Ordered list of members as stored in the shared record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipList(Vec<MemberEntry>);

impl MembershipList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MemberEntry> {
        self.0.iter()
    }

    pub fn entries(&self) -> &[MemberEntry] {
        &self.0
    }

    pub fn into_entries(self) -> Vec<MemberEntry> {
        self.0
    }

    /// First entry carrying `name`.
    pub fn find(&self, name: &ServerName) -> Option<&MemberEntry> {
        self.0.iter().find(|e| &e.name == name)
    }

    /// Insert or refresh the entry for `name` and return it as it now stands.
    ///
    /// A resolved address replaces the stored one; an unavailable lookup keeps
    /// whatever address the entry already had. Later duplicates of `name` are
    /// dropped so the list leaves this call with exactly one own entry.
    pub fn upsert_self(
        &mut self,
        name: &ServerName,
        address: &AddressLookup,
        now: DateTime<Utc>,
    ) -> MemberEntry {
        let Some(pos) = self.0.iter().position(|e| &e.name == name) else {
            let entry = MemberEntry::announce(name.clone(), address, now);
            self.0.push(entry.clone());
            return entry;
        };

        let mut seen = 0usize;
        self.0.retain(|e| {
            if &e.name != name {
                return true;
            }
            seen += 1;
            seen == 1
        });

        let entry = &mut self.0[pos];
        if let Some(addr) = address.resolved() {
            entry.address = Some(addr.to_owned());
        }
        entry.last_seen = now;
        entry.clone()
    }

    /// Drop every entry older than `retention` and return the removed ones.
    ///
    /// An entry exactly `retention` old survives. Relative order of the kept
    /// entries is unchanged.
    pub fn prune_stale(&mut self, retention: Duration, now: DateTime<Utc>) -> Vec<MemberEntry> {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.0)
            .into_iter()
            .partition(|e| age(e, now) <= retention);
        self.0 = kept;
        removed
    }
}

impl From<Vec<MemberEntry>> for MembershipList {
    fn from(entries: Vec<MemberEntry>) -> Self {
        Self(entries)
    }
}

impl<'a> IntoIterator for &'a MembershipList {
    type Item = &'a MemberEntry;
    type IntoIter = std::slice::Iter<'a, MemberEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Age of an entry relative to `now`. Entries stamped in the future count as
/// brand new.
pub fn age(entry: &MemberEntry, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(entry.last_seen)
        .to_std()
        .unwrap_or_default()
}
