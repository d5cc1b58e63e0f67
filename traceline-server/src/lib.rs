//! The Traceline ingestion service.
//!
//! Accepts batched telemetry events from SDKs on `POST
//! /api/public/ingestion`, authenticates and rate-limits the caller,
//! validates and persists each event idempotently, and notifies the worker
//! service about upserted traces so that automated evaluations can run.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod extractors;
pub mod middlewares;
pub mod processors;
pub mod service;
pub mod services;
pub mod statsd;
pub mod utils;

pub use self::config::Config;
pub use self::service::ServiceState;
