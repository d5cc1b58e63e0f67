//! Logging and error reporting facade for Traceline services.
//!
//! All crates in the workspace log through the macros re-exported from this
//! crate (`traceline_log::info!` and friends), so that subscriber setup and
//! Sentry reporting are owned by exactly one place. Services call [`init`]
//! once at startup; everything before that still works and falls back to
//! `stderr` via [`ensure_error`].

mod setup;
mod utils;

pub use self::setup::*;
pub use self::utils::*;

// Expose the tracing macros under our own name so call sites read
// `traceline_log::error!(..)` throughout the workspace.
pub use tracing::{debug, error, info, trace, warn, Instrument, Level, Span};

/// Constructs a named span for asynchronous work.
///
/// Consumers wrap their per-job future with `.instrument(span)`. Queue
/// consumers use `root = true` so that each job starts a fresh trace instead
/// of attaching to whatever span happens to be current.
pub fn span(name: &'static str, root: bool) -> Span {
    if root {
        tracing::info_span!(parent: None, "job", job = name)
    } else {
        tracing::info_span!("job", job = name)
    }
}
