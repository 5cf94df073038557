//! [`RemoteStore`] backed by the registry API of a local skyd node.
//!
//! - `GET  /skynet/registry?publickey=ed25519:<hex>&datakey=<hex>` reads the
//!   record; 404 means it was never written.
//! - `POST /skynet/registry` writes a signed update. skyd answers 400 both
//!   when the revision is not newer than the one it holds and for malformed or
//!   badly signed updates; only the former is a [`StoreError::Conflict`].
//!
//! The update signature covers skyd's registry value hash (see
//! [`StoreKeys::sign_update`]).

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use serverlist_core::Revision;

use crate::error::StoreError;
use crate::keys::StoreKeys;
use crate::store::{DataKey, RemoteStore, StoreRecord};

const REGISTRY_PATH: &str = "/skynet/registry";
const USER_AGENT: &str = "Sia-Agent";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: String,
    revision: u64,
}

#[derive(Debug, Serialize)]
struct PublicKeyBody<'a> {
    algorithm: &'static str,
    key: &'a str,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    publickey: PublicKeyBody<'a>,
    datakey: String,
    revision: u64,
    data: String,
    signature: String,
}

#[derive(Debug, Clone)]
pub struct SkydStore {
    base_url: String,
    authorization: String,
    keys: StoreKeys,
    agent: ureq::Agent,
}

impl SkydStore {
    /// `address` is skyd's `host:port`; a scheme is added when missing.
    pub fn new(address: &str, api_password: &str, keys: StoreKeys) -> Self {
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        Self {
            base_url,
            authorization: basic_auth(api_password),
            keys,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    pub fn registry_url(&self) -> String {
        format!("{}{REGISTRY_PATH}", self.base_url)
    }

    fn request(&self, method: &str) -> ureq::Request {
        self.agent
            .request(method, &self.registry_url())
            .set("User-Agent", USER_AGENT)
            .set("Authorization", &self.authorization)
    }
}

impl RemoteStore for SkydStore {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        let endpoint = self.registry_url();
        let response = self
            .request("GET")
            .query("publickey", &format!("ed25519:{}", self.keys.public_key_hex()))
            .query("datakey", &hex::encode(key))
            .call();

        match response {
            Ok(resp) => {
                let body: ReadResponse = resp
                    .into_json()
                    .map_err(|err| StoreError::Malformed(err.to_string()))?;
                parse_read(body)
            }
            Err(ureq::Error::Status(404, _)) => Err(StoreError::NotFound),
            Err(err) => Err(map_ureq_error(endpoint, err)),
        }
    }

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError> {
        let endpoint = self.registry_url();
        let public_key = STANDARD.encode(self.keys.public_key().as_bytes());
        let signature = self.keys.sign_update(data, revision);
        let body = WriteRequest {
            publickey: PublicKeyBody {
                algorithm: "ed25519",
                key: &public_key,
            },
            datakey: hex::encode(key),
            revision: revision.0,
            data: STANDARD.encode(data),
            signature: STANDARD.encode(signature.to_bytes()),
        };

        match self.request("POST").send_json(&body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(400, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                if is_revision_rejection(&body) {
                    Err(StoreError::Conflict { revision })
                } else {
                    Err(StoreError::Status {
                        endpoint,
                        status: 400,
                        body,
                    })
                }
            }
            Err(err) => Err(map_ureq_error(endpoint, err)),
        }
    }
}

/// skyd's revision errors all mention the revision number.
fn is_revision_rejection(body: &str) -> bool {
    body.to_ascii_lowercase().contains("revision")
}

fn parse_read(body: ReadResponse) -> Result<StoreRecord, StoreError> {
    let data = hex::decode(&body.data)
        .map_err(|err| StoreError::Malformed(format!("registry data is not hex: {err}")))?;
    Ok(StoreRecord {
        data,
        revision: Revision(body.revision),
    })
}

fn map_ureq_error(endpoint: String, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, resp) => StoreError::Status {
            endpoint,
            status,
            body: resp.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => StoreError::Transport {
            endpoint,
            message: transport.to_string(),
        },
    }
}

/// skyd authenticates with an empty user name and the API password.
fn basic_auth(password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{password}")))
}
