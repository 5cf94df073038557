//! Key material addressing the shared record.
//!
//! The Ed25519 keypair is derived deterministically from the configured
//! entropy, so every host holding the same entropy signs for the same record.
//! The tweak is used as the record's data key.
//!
//! Hashes follow skyd's registry: blake2b-256 over Sia's binary encoding,
//! where fixed-size arrays are written raw and byte slices carry a `u64`
//! little-endian length prefix.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use serverlist_core::{Config, KeyConfig, Revision};

use crate::store::DataKey;

type Blake2b256 = Blake2b<U32>;

/// Skylink bitfield marking a version 2 (registry entry) link.
const LOCATOR_BITFIELD: u16 = 1;
const LOCATOR_SCHEME: &str = "sia://";

/// Sia's 16-byte specifier for Ed25519 keys.
const ED25519_SPECIFIER: [u8; 16] = *b"ed25519\0\0\0\0\0\0\0\0\0";

#[derive(Clone)]
pub struct StoreKeys {
    signing_key: SigningKey,
    data_key: DataKey,
}

impl fmt::Debug for StoreKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreKeys")
            .field("public_key", &self.public_key_hex())
            .field("data_key", &hex::encode(self.data_key))
            .finish()
    }
}

impl StoreKeys {
    pub fn derive(entropy: &[u8; 32], tweak: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(entropy),
            data_key: *tweak,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::from_key_config(&config.keys())
    }

    pub fn from_key_config(keys: &KeyConfig) -> Self {
        Self::derive(&keys.entropy, &keys.tweak)
    }

    pub fn data_key(&self) -> &DataKey {
        &self.data_key
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key().as_bytes())
    }

    /// Signature over the registry value hash, as skyd verifies it.
    pub fn sign_update(&self, data: &[u8], revision: Revision) -> Signature {
        self.signing_key.sign(&update_digest(&self.data_key, data, revision))
    }

    /// Registry entry id: `blake2b(specifier || len || public_key || data_key)`.
    pub fn entry_id(&self) -> [u8; 32] {
        let mut hasher = Blake2b256::new();
        hasher.update(ED25519_SPECIFIER);
        update_prefixed(&mut hasher, self.public_key().as_bytes());
        hasher.update(self.data_key);
        hasher.finalize().into()
    }

    /// Version 2 skylink of the record, printed after a successful update.
    pub fn locator(&self) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.extend_from_slice(&LOCATOR_BITFIELD.to_le_bytes());
        payload.extend_from_slice(&self.entry_id());
        format!("{LOCATOR_SCHEME}{}", URL_SAFE_NO_PAD.encode(payload))
    }
}

/// `blake2b(data_key || len || data || revision_le)`.
pub(crate) fn update_digest(data_key: &DataKey, data: &[u8], revision: Revision) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data_key);
    update_prefixed(&mut hasher, data);
    hasher.update(revision.0.to_le_bytes());
    hasher.finalize().into()
}

fn update_prefixed(hasher: &mut Blake2b256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
