/// Command and message handlers
pub mod handlers;
/// Reply delivery (rendering, length limits)
pub mod messaging;
/// Unauthorized access flood protection
pub mod unauthorized_cache;

pub use unauthorized_cache::UnauthorizedCache;
