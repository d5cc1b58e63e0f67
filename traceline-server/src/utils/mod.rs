//! Small helpers shared across the server.

mod retry;

pub use self::retry::*;
