//! Network layer for Recplay
//!
//! Provides the [`Transport`] seam and a hyper-based client that talks to
//! the proxy over HTTP or TLS.

mod client;
mod tls;
mod transport;

pub use client::HttpClient;
pub use tls::insecure_client_config;
pub use transport::{
    body_text, boxed_body, empty_body, full_body, read_body, RequestBody, RequestUri,
    ResponseBody, Transport,
};
