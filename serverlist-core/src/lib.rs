//! serverlist core library: membership model, codec, configuration, errors.
//!
//! - [`types`]: newtypes and the [`MemberEntry`] record
//! - [`membership`]: [`MembershipList`] with the upsert / prune / verify rules
//! - [`codec`]: JSON payload encoding for the shared record
//! - [`config`]: environment-driven [`Config`]
//! - [`error`]: [`CodecError`], [`ConfigError`]

pub mod codec;
pub mod config;
pub mod error;
pub mod membership;
pub mod types;

pub use config::{Config, KeyConfig};
pub use error::{CodecError, ConfigError};
pub use membership::{MembershipList, RETENTION_WINDOW, VERIFY_WINDOW};
pub use types::{AddressLookup, MemberEntry, Revision, ServerName};
