//! Internal collaborators of the ingestion endpoint: authentication, rate
//! limit enforcement, the persistence seam for event processors, and the
//! cross-service trace fan-out.

mod auth;
mod dispatcher;
mod rate_limit;
mod store;

pub use self::auth::*;
pub use self::dispatcher::*;
pub use self::rate_limit::*;
pub use self::store::*;
