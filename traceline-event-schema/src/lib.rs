//! Shared schema types for the Traceline ingestion pipeline.
//!
//! This crate defines the inbound event model accepted by the ingestion
//! endpoint, the identifier newtypes used across services, the API-key scope
//! types produced by authentication, and the payloads exchanged over the job
//! queues. It intentionally contains no I/O.

mod auth;
mod event;
mod ids;
mod jobs;
mod limits;
mod scrub;

pub use self::auth::*;
pub use self::event::*;
pub use self::ids::*;
pub use self::jobs::*;
pub use self::limits::*;
pub use self::scrub::*;
