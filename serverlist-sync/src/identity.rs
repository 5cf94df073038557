//! Best-effort discovery of this host's externally visible address.
//!
//! Resolvers never fail a round: every problem becomes
//! [`AddressLookup::Unavailable`] and the previously stored address is kept.

use std::net::Ipv4Addr;
use std::time::Duration;

use serverlist_core::AddressLookup;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

pub trait AddressResolver {
    fn resolve(&self) -> AddressLookup;
}

impl<T: AddressResolver + ?Sized> AddressResolver for &T {
    fn resolve(&self) -> AddressLookup {
        (**self).resolve()
    }
}

/// Asks an external "what is my IP" service, e.g. `https://api.ipify.org`.
#[derive(Debug, Clone)]
pub struct HttpAddressResolver {
    url: String,
    agent: ureq::Agent,
}

impl HttpAddressResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(LOOKUP_TIMEOUT).build(),
        }
    }

    fn lookup(&self) -> Result<String, String> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|err| format!("failed to query {}: {err}", self.url))?;
        let body = response
            .into_string()
            .map_err(|err| format!("failed to read {} response: {err}", self.url))?;
        parse_ipv4(&body).ok_or_else(|| format!("invalid ip received '{}'", body.trim()))
    }
}

impl AddressResolver for HttpAddressResolver {
    fn resolve(&self) -> AddressLookup {
        match self.lookup() {
            Ok(ip) => AddressLookup::Resolved(ip),
            Err(reason) => AddressLookup::Unavailable(reason),
        }
    }
}

/// Always returns the same answer. Backs `--address` / `--no-address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAddress(pub AddressLookup);

impl StaticAddress {
    pub fn resolved(addr: impl Into<String>) -> Self {
        Self(AddressLookup::Resolved(addr.into()))
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self(AddressLookup::Unavailable(reason.into()))
    }
}

impl AddressResolver for StaticAddress {
    fn resolve(&self) -> AddressLookup {
        self.0.clone()
    }
}

/// Accept only a bare dotted-quad IPv4 address (surrounding whitespace
/// allowed). IPv6 answers are treated as unavailable.
pub fn parse_ipv4(body: &str) -> Option<String> {
    let candidate = body.trim();
    candidate
        .parse::<Ipv4Addr>()
        .ok()
        .map(|_| candidate.to_string())
}
