//! Request interception
//!
//! Rewrites each outgoing request to target the proxy and restores the
//! original target on the way back.

mod context;
mod transport;

pub use context::{restore_response, rewrite_request, InterceptContext};
pub use transport::InterceptingTransport;
