// crates/server/src/liveattrs/mod.rs
//! Attribute value queries: configuration store, result cache, usage
//! recording and the service functions the routes call.

pub mod cache;
pub mod conf;
pub mod service;
pub mod usage;

pub use cache::QueryCache;
pub use conf::ExtractionConfLoader;
pub use usage::{UsageRecord, UsageRecorder};
