//! Contact resolution: phone validation, the upstream lookup client, and a
//! TTL + rate-limit + single-flight cache in front of it.

pub mod error;
pub mod lookup;
pub mod policy;
pub mod resolver;
pub mod store;

pub use {
    error::{ContactError, Result},
    lookup::{ContactLookup, HttpContactLookup, LookupOutcome},
    policy::{PhoneRejection, validate_phone},
    resolver::{CachePolicy, ContactResolution, ContactResolver},
    store::{CacheEntry, ContactCacheStore, ContactProfileSink},
};
