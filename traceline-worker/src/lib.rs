//! The Traceline evaluation worker.
//!
//! Receives trace-upsert notifications from the ingestion server on
//! `POST /api/events`, enqueues them durably, and runs two consumer pools:
//! the eval-job creator materializes pending evaluation jobs from the
//! project's configured rules, and the eval executor runs each job against
//! an LLM judge and persists the outcome.

pub mod config;
pub mod endpoints;
pub mod eval;
pub mod handlers;
pub mod service;
pub mod statsd;

pub use self::config::Config;
pub use self::service::WorkerState;
