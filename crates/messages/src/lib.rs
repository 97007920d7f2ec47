//! Canonical message model and webhook normalization.
//!
//! The messaging provider delivers the same logical "message received" event
//! in several payload shapes. [`normalize`] maps any of them onto one
//! [`CanonicalMessage`]; [`classify`] is the single message-type decision
//! table shared by ingestion and fan-out formatting.

pub mod classify;
pub mod error;
pub mod jid;
pub mod model;
pub mod normalize;
pub mod store;

pub use {
    classify::{Classified, classify},
    error::{Error, Result},
    model::{CanonicalMessage, ContactAggregate, Direction, MessageType},
    normalize::{
        MESSAGES_UPSERT, PayloadShape, Rejection, canonical_event_name, normalize, normalize_at,
    },
    store::{MessageStore, PersistOutcome},
};
