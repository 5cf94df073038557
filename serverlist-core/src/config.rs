//! Runtime configuration, read once at startup from environment variables.
//!
//! Variables may also come from an env file (`KEY=VALUE` per line). Values set
//! in the process environment take precedence over the file.
//!
//! # API pattern
//!
//! - [`Config::from_lookup`] builds a config from any key lookup; tests use it
//!   with a `HashMap` so they never touch the process environment.
//! - [`Config::load`] wires the process environment and an optional env file
//!   into `from_lookup`.
//! - [`KeyConfig`] is the entropy/tweak subset, for commands that only need
//!   to address the record.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::ConfigError;
use crate::types::ServerName;

pub const ENV_OWN_NAME: &str = "SKYNET_SERVER_API";
pub const ENV_ENTROPY: &str = "SERVERLIST_ENTROPY";
pub const ENV_TWEAK: &str = "SERVERLIST_TWEAK";
pub const ENV_SKYD: &str = "SERVERLIST_SKYD";
pub const ENV_API_PASSWORD: &str = "SIA_API_PASSWORD";
pub const ENV_MAX_ROUNDS: &str = "SERVERLIST_MAX_ROUNDS";
pub const ENV_IP_SERVICE: &str = "SERVERLIST_IP_SERVICE";

pub const DEFAULT_SKYD_ADDRESS: &str = "localhost:9980";
pub const DEFAULT_IP_SERVICE: &str = "https://api.ipify.org";

/// Everything the tool needs to know before the first round.
///
/// `entropy` and `tweak` select the shared record; every host that should
/// appear on the same list must use the same pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub own_name: ServerName,
    pub entropy: [u8; 32],
    pub tweak: [u8; 32],
    /// `host:port` of the local skyd API.
    pub skyd_address: String,
    pub skyd_api_password: String,
    /// `None` retries forever.
    pub max_rounds: Option<u32>,
    pub ip_service: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("own_name", &self.own_name)
            .field("entropy", &"<redacted>")
            .field("tweak", &hex::encode(self.tweak))
            .field("skyd_address", &self.skyd_address)
            .field("skyd_api_password", &"<redacted>")
            .field("max_rounds", &self.max_rounds)
            .field("ip_service", &self.ip_service)
            .finish()
    }
}

impl Config {
    /// Build a config from a variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing { var });

        let own_name = normalize_own_name(&require(ENV_OWN_NAME)?);
        if own_name.is_empty() {
            return Err(ConfigError::Missing { var: ENV_OWN_NAME });
        }

        let KeyConfig { entropy, tweak } = KeyConfig::from_lookup(&lookup)?;
        let skyd_address = get(ENV_SKYD).unwrap_or_else(|| DEFAULT_SKYD_ADDRESS.to_string());
        let skyd_api_password = require(ENV_API_PASSWORD)?;
        let max_rounds = match get(ENV_MAX_ROUNDS) {
            None => None,
            Some(raw) => parse_max_rounds(&raw)?,
        };
        let ip_service = get(ENV_IP_SERVICE).unwrap_or_else(|| DEFAULT_IP_SERVICE.to_string());

        Ok(Self {
            own_name: ServerName(own_name),
            entropy,
            tweak,
            skyd_address,
            skyd_api_password,
            max_rounds,
            ip_service,
        })
    }

    /// Load from the process environment, falling back to `env_file` for
    /// variables the environment does not set.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_lookup(environment(env_file)?)
    }

    pub fn keys(&self) -> KeyConfig {
        KeyConfig {
            entropy: self.entropy,
            tweak: self.tweak,
        }
    }
}

/// The settings that select the shared record, and nothing else.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyConfig {
    pub entropy: [u8; 32],
    pub tweak: [u8; 32],
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("entropy", &"<redacted>")
            .field("tweak", &hex::encode(self.tweak))
            .finish()
    }
}

impl KeyConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing { var })
        };
        Ok(Self {
            entropy: decode_key(ENV_ENTROPY, &require(ENV_ENTROPY)?)?,
            tweak: decode_key(ENV_TWEAK, &require(ENV_TWEAK)?)?,
        })
    }

    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_lookup(environment(env_file)?)
    }
}

/// Process environment first, then the env file.
fn environment(
    env_file: Option<&Path>,
) -> Result<impl Fn(&str) -> Option<String>, ConfigError> {
    let file_vars = match env_file {
        Some(path) => parse_env_file(path)?,
        None => BTreeMap::new(),
    };
    Ok(move |var: &str| {
        std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| file_vars.get(var).cloned())
    })
}

/// Read an env file into a map. Later assignments of the same key win.
pub fn parse_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_env_str(&contents).map_err(|(line, reason)| ConfigError::EnvFile {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

/// Parse env-file text. Errors carry the 1-based line number.
fn parse_env_str(contents: &str) -> Result<BTreeMap<String, String>, (usize, String)> {
    let mut vars = BTreeMap::new();
    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return Err((idx + 1, "expected KEY=VALUE".to_string()));
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err((idx + 1, format!("invalid key '{key}'")));
        }
        vars.insert(key.to_string(), parse_value(value).to_string());
    }
    Ok(vars)
}

/// Quoted values are taken verbatim up to the closing quote; unquoted ones
/// end at a ` #` comment.
fn parse_value(raw: &str) -> &str {
    let value = raw.trim();
    for quote in ['"', '\''] {
        let Some(rest) = value.strip_prefix(quote) else {
            continue;
        };
        if let Some(end) = rest.find(quote) {
            let tail = rest[end + 1..].trim_start();
            if tail.is_empty() || tail.starts_with('#') {
                return &rest[..end];
            }
        }
    }
    match value.find(" #").or_else(|| value.find("\t#")) {
        Some(idx) => value[..idx].trim_end(),
        None => value,
    }
}

/// Hosts announce themselves by API URL; the list stores the bare host.
fn normalize_own_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let name = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    name.trim_end_matches('/').to_string()
}

fn decode_key(var: &'static str, raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(raw.trim()).map_err(|source| ConfigError::InvalidHex { var, source })?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ConfigError::InvalidLength {
            var,
            expected: 32,
            actual: bytes.len(),
        })
}

fn parse_max_rounds(raw: &str) -> Result<Option<u32>, ConfigError> {
    let rounds: u32 = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var: ENV_MAX_ROUNDS,
        value: raw.to_string(),
    })?;
    Ok((rounds > 0).then_some(rounds))
}
