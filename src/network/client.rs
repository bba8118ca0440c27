//! HTTP client used for lifecycle calls and as the base send primitive

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tracing::{debug, warn};

use super::tls::insecure_client_config;
use super::transport::{RequestBody, RequestUri, ResponseBody, Transport};
use crate::{RecplayError, Result};

/// HTTP(S) client with certificate verification disabled
///
/// Cloning is cheap and shares the connection pool. Build one per test run
/// and hand it to both the session controller and the intercepting transport.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, RequestBody>,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    ///
    /// Returns error if the TLS configuration cannot be built
    pub fn new() -> Result<Self> {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(insecure_client_config()?)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(https_connector);

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: Request<RequestBody>) -> Result<Response<ResponseBody>> {
        let uri = request.uri().clone();

        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(RecplayError::InvalidRequest(format!(
                "URI '{uri}' is not absolute"
            )));
        }

        debug!("Sending {} {}", request.method(), uri);

        let response = self.client.request(request).await.map_err(|e| {
            warn!("Request to {uri} failed: {e}");
            RecplayError::Transport(e)
        })?;

        debug!("Received {} from {}", response.status(), uri);

        let (mut parts, body) = response.into_parts();
        parts.extensions.insert(RequestUri(uri));

        Ok(Response::from_parts(parts, body.boxed()))
    }
}
