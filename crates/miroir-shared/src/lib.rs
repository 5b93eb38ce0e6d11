//! Shared domain types for the miroir workspace: the records projected out
//! of the upstream event stream, the event kinds themselves, and the
//! broadcast bus that carries them.

pub mod constants;
pub mod events;
pub mod models;
