//! The pluggable send primitive and the response back-reference

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, Uri};

use crate::Result;

/// Body type of every outgoing request
pub type RequestBody = Full<Bytes>;

/// Body type of every response handed back to callers
pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Something that can send a request and hand back the response
///
/// Implemented by [`HttpClient`](super::HttpClient) for real traffic and by
/// [`InterceptingTransport`](crate::intercept::InterceptingTransport) to route
/// traffic through the proxy. Application code should depend on this trait
/// so either can be plugged in.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request
    ///
    /// # Errors
    ///
    /// Returns error if the request could not be sent or no response arrived
    async fn send(&self, request: Request<RequestBody>) -> Result<Response<ResponseBody>>;
}

/// URI of the request a response was issued for
///
/// Stored in the response extensions. Follow-up logic such as
/// long-running-operation polling reads it to find out where to go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUri(pub Uri);

impl RequestUri {
    /// Read the back-reference off a response, if present
    #[must_use]
    pub fn of<B>(response: &Response<B>) -> Option<&Uri> {
        response.extensions().get::<Self>().map(|r| &r.0)
    }
}

/// Build a request body from anything byte-like
pub fn full_body(data: impl Into<Bytes>) -> RequestBody {
    Full::new(data.into())
}

/// Empty request body
#[must_use]
pub fn empty_body() -> RequestBody {
    Full::new(Bytes::new())
}

/// Box a fully buffered body into a [`ResponseBody`]
pub fn boxed_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Read a whole response body
///
/// # Errors
///
/// Returns error if reading the body fails
pub async fn read_body(body: ResponseBody) -> Result<Bytes> {
    Ok(body.collect().await?.to_bytes())
}

/// Read a whole response body as lossy UTF-8
///
/// # Errors
///
/// Returns error if reading the body fails
pub async fn body_text(body: ResponseBody) -> Result<String> {
    let bytes = read_body(body).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
