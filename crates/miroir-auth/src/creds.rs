//! Credential material the upstream socket consumes.
//!
//! The replica core treats all of this as an opaque JSON-serializable
//! blob; the only structure that matters here is which fields are byte
//! arrays, so they round-trip through the buffer codec.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Registration ids are 14-bit, like the upstream protocol expects.
const REGISTRATION_ID_MASK: u32 = 0x3fff;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    #[serde(with = "crate::codec::buffer")]
    pub public: Vec<u8>,
    #[serde(with = "crate::codec::buffer")]
    pub private: Vec<u8>,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(&signing_key)
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        Self {
            public: signing_key.verifying_key().to_bytes().to_vec(),
            private: signing_key.to_bytes().to_vec(),
        }
    }

    /// Short hex fingerprint of the public key, for logs.
    pub fn fingerprint(&self) -> String {
        let head = &self.public[..self.public.len().min(8)];
        hex::encode(head)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedKeyPair {
    pub key_pair: KeyPair,
    #[serde(with = "crate::codec::buffer")]
    pub signature: Vec<u8>,
    pub key_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    pub unarchive_chats: bool,
}

/// Who this session authenticated as, once known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCreds {
    pub noise_key: KeyPair,
    pub signed_identity_key: KeyPair,
    pub signed_pre_key: SignedKeyPair,
    pub registration_id: u32,
    #[serde(with = "crate::codec::buffer")]
    pub adv_secret_key: Vec<u8>,
    pub next_pre_key_id: u32,
    pub first_unuploaded_pre_key_id: u32,
    pub registered: bool,
    #[serde(default)]
    pub account_settings: AccountSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<OwnerInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processed_history_messages: Vec<serde_json::Value>,
}

impl AuthCreds {
    /// Fresh credentials for a session that has never paired.
    pub fn init() -> Self {
        let identity = SigningKey::generate(&mut OsRng);

        let mut adv_secret_key = vec![0u8; 32];
        OsRng.fill_bytes(&mut adv_secret_key);

        Self {
            noise_key: KeyPair::generate(),
            signed_identity_key: KeyPair::from_signing_key(&identity),
            signed_pre_key: signed_key_pair(&identity, 1),
            registration_id: (OsRng.next_u32() & REGISTRATION_ID_MASK).max(1),
            adv_secret_key,
            next_pre_key_id: 1,
            first_unuploaded_pre_key_id: 1,
            registered: false,
            account_settings: AccountSettings::default(),
            me: None,
            processed_history_messages: Vec::new(),
        }
    }
}

fn signed_key_pair(identity: &SigningKey, key_id: u32) -> SignedKeyPair {
    let key_pair = KeyPair::generate();
    let signature = identity.sign(&key_pair.public).to_bytes().to_vec();
    SignedKeyPair {
        key_pair,
        signature,
        key_id,
    }
}

/// Stored payload of an app-state sync key, reconstructed on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateSyncKeyData {
    #[serde(default, with = "crate::codec::buffer_opt")]
    pub key_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}
