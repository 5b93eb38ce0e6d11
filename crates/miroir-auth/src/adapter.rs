//! Session-namespaced persistence of credentials and signal keys over a
//! [`KvStore`].
//!
//! Every logical file lives under `"{session_key}:{name}"`, so several
//! sessions can share one store. Store errors never escape: reads degrade
//! to absent, writes and deletes to logged no-ops — the socket must keep
//! running on a flaky store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::creds::{AppStateSyncKeyData, AuthCreds};
use crate::kv::KvStore;

/// Logical file the credential blob is stored under.
const CREDS_FILE: &str = "creds";

/// Signal key category whose payloads are reconstructed into
/// [`AppStateSyncKeyData`] on read.
const APP_STATE_SYNC_KEY: &str = "app-state-sync-key";

/// How long the credential blob lives in the store.
const CREDS_TTL: Duration = Duration::from_secs(2 * 365 * 24 * 60 * 60);

/// A stored signal key, typed where the category has a known shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalKeyValue {
    AppStateSyncKey(AppStateSyncKeyData),
    Raw(Value),
}

pub struct AuthStateAdapter {
    kv: Arc<dyn KvStore>,
    session_key: String,
    /// In-memory credential record; [`save_creds`](Self::save_creds)
    /// persists it.
    pub creds: AuthCreds,
}

impl AuthStateAdapter {
    /// Load the session's credentials from the store, initializing fresh
    /// material when nothing (readable) is there.
    pub async fn new(kv: Arc<dyn KvStore>, session_key: impl Into<String>) -> Self {
        let session_key = session_key.into();
        let phys = format!("{session_key}:{CREDS_FILE}");

        let creds = match kv.get(&phys).await {
            Ok(Some(json)) => match codec::from_json::<AuthCreds>(&json) {
                Ok(creds) => {
                    debug!(session = %session_key, "credentials restored");
                    Some(creds)
                }
                Err(e) => {
                    warn!(session = %session_key, error = %e, "stored credentials unreadable, reinitializing");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!(session = %session_key, error = %e, "credential read failed, reinitializing");
                None
            }
        };

        let creds = creds.unwrap_or_else(|| {
            info!(session = %session_key, "initializing fresh credentials");
            AuthCreds::init()
        });

        Self {
            kv,
            session_key,
            creds,
        }
    }

    fn phys_key(&self, logical: &str) -> String {
        format!("{}:{}", self.session_key, logical)
    }

    /// Persist the credential blob under `"creds"` with a two-year TTL.
    pub async fn save_creds(&self) {
        let json = match codec::to_json(&self.creds) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "credential serialization failed");
                return;
            }
        };
        if let Err(e) = self
            .kv
            .set(&self.phys_key(CREDS_FILE), &json, Some(CREDS_TTL))
            .await
        {
            error!(error = %e, "credential write failed");
        }
    }

    /// Wipe the underlying store. This clears the ENTIRE keyspace, not
    /// just this session's slice — isolate sessions at the store level if
    /// that matters.
    pub async fn clear_state(&self) {
        if let Err(e) = self.kv.clear().await {
            error!(error = %e, "store clear failed");
        }
    }

    /// Fetch stored signal keys of one category. Every requested id is
    /// present in the result, unreadable or missing ones as `None`.
    pub async fn get_keys(
        &self,
        category: &str,
        ids: &[&str],
    ) -> HashMap<String, Option<SignalKeyValue>> {
        let mut result = HashMap::with_capacity(ids.len());
        for &id in ids {
            let phys = self.phys_key(&format!("{category}-{id}"));
            let value = match self.kv.get(&phys).await {
                Ok(Some(json)) => parse_key(category, &json),
                Ok(None) => None,
                Err(e) => {
                    error!(key = %phys, error = %e, "signal key read failed");
                    None
                }
            };
            result.insert(id.to_string(), value);
        }
        result
    }

    /// Write signal keys: `category -> id -> value`, where a `None` value
    /// deletes the entry.
    pub async fn set_keys(&self, data: &HashMap<String, HashMap<String, Option<Value>>>) {
        for (category, entries) in data {
            for (id, value) in entries {
                let phys = self.phys_key(&format!("{category}-{id}"));
                match value {
                    Some(value) => {
                        let json = match codec::to_json(value) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(key = %phys, error = %e, "signal key serialization failed");
                                continue;
                            }
                        };
                        if let Err(e) = self.kv.set(&phys, &json, None).await {
                            error!(key = %phys, error = %e, "signal key write failed");
                        }
                    }
                    None => {
                        if let Err(e) = self.kv.delete(&phys).await {
                            error!(key = %phys, error = %e, "signal key delete failed");
                        }
                    }
                }
            }
        }
    }
}

fn parse_key(category: &str, json: &str) -> Option<SignalKeyValue> {
    if category == APP_STATE_SYNC_KEY {
        match codec::from_json::<AppStateSyncKeyData>(json) {
            Ok(data) => return Some(SignalKeyValue::AppStateSyncKey(data)),
            Err(e) => {
                warn!(error = %e, "app state sync key unreadable");
                return None;
            }
        }
    }
    match codec::from_json::<Value>(json) {
        Ok(value) => Some(SignalKeyValue::Raw(value)),
        Err(e) => {
            warn!(error = %e, "signal key unreadable");
            None
        }
    }
}
