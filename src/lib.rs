//! Recplay - client-side shim for record/playback HTTP test proxies
//!
//! Routes application traffic through a running proxy so tests replay
//! deterministically, while callers keep seeing the real service URLs.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod headers;
pub mod intercept;
pub mod network;
pub mod scope;
pub mod session;
pub mod telemetry;

pub use config::{Config, Mode, ProxyEndpoint, Scheme};
pub use error::{RecplayError, Result};
pub use intercept::InterceptingTransport;
pub use network::{HttpClient, Transport};
pub use scope::{start_session, with_session, ActiveSession};
pub use session::{Session, SessionController};
