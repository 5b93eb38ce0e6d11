//! Key-value-backed persistence of the authentication state an upstream
//! socket consumes: credential material with embedded byte arrays, signal
//! keys, and the JSON codec that carries both.

pub mod adapter;
pub mod codec;
pub mod creds;
pub mod error;
pub mod kv;

pub use adapter::{AuthStateAdapter, SignalKeyValue};
pub use creds::{AppStateSyncKeyData, AuthCreds, KeyPair, SignedKeyPair};
pub use error::{AuthError, Result};
pub use kv::{KvStore, MemoryKv, SqliteKv};
