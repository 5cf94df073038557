//! Domain types for the shared server list.
//!
//! Wire names follow the records already stored by deployed hosts:
//! `name`, `ip`, `last_announce`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// The self-reported name of a host, e.g. `dev1.siasky.dev`. Natural key of
/// the membership list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(pub String);

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Store-assigned version counter. Only ever echoed back incremented by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(pub u64);

impl Revision {
    /// Revision of a key that has never been written.
    pub const ZERO: Revision = Revision(0);

    /// The revision a write based on `self` must carry.
    pub fn next(self) -> Revision {
        Revision(self.0.saturating_add(1))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Address lookup result
// ---------------------------------------------------------------------------

/// Outcome of the best-effort external address lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressLookup {
    Resolved(String),
    /// The lookup failed; the reason is only ever logged.
    Unavailable(String),
}

impl AddressLookup {
    pub fn resolved(&self) -> Option<&str> {
        match self {
            AddressLookup::Resolved(addr) => Some(addr),
            AddressLookup::Unavailable(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One host on the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub name: ServerName,
    /// `Some("")` means "never resolved"; `None` means the field was absent.
    #[serde(rename = "ip", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "last_announce")]
    pub last_seen: DateTime<Utc>,
}

impl MemberEntry {
    /// Entry for a host that has just announced itself.
    pub fn announce(name: ServerName, address: &AddressLookup, now: DateTime<Utc>) -> Self {
        Self {
            name,
            address: Some(address.resolved().unwrap_or_default().to_owned()),
            last_seen: now,
        }
    }
}
