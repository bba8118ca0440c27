//! Per-request rewrite and restore

use hyper::header::{HeaderValue, HOST};
use hyper::http::uri::{Authority, PathAndQuery, Scheme as UriScheme};
use hyper::{Request, Response, Uri};

use crate::config::{Mode, ProxyEndpoint, Scheme};
use crate::headers::{RECORDING_ID, RECORDING_MODE, RECORDING_UPSTREAM_BASE_URI};
use crate::network::RequestUri;
use crate::{RecplayError, Result};

/// What a request looked like before it was pointed at the proxy
///
/// Captured at the start of a send and consumed when the response comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptContext {
    scheme: UriScheme,
    authority: Authority,
    mode: Mode,
    recording_id: String,
}

impl InterceptContext {
    /// Capture the origin of an absolute URI
    ///
    /// # Errors
    ///
    /// Returns error if the URI has no scheme or authority
    pub fn capture(uri: &Uri, mode: Mode, recording_id: &str) -> Result<Self> {
        let (Some(scheme), Some(authority)) = (uri.scheme(), uri.authority()) else {
            return Err(RecplayError::InvalidRequest(format!(
                "cannot route relative URI '{uri}' through the proxy"
            )));
        };

        Ok(Self {
            scheme: scheme.clone(),
            authority: authority.clone(),
            mode,
            recording_id: recording_id.to_string(),
        })
    }

    /// Original scheme
    #[must_use]
    pub fn scheme(&self) -> &UriScheme {
        &self.scheme
    }

    /// Original authority, including any userinfo
    #[must_use]
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Mode the request was tagged with
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Recording id the request was tagged with
    #[must_use]
    pub fn recording_id(&self) -> &str {
        &self.recording_id
    }

    /// `scheme://host[:port]` of the real service
    ///
    /// Userinfo is left out so credentials never reach the proxy.
    #[must_use]
    pub fn upstream_base_uri(&self) -> String {
        match self.authority.port() {
            Some(port) => format!("{}://{}:{port}", self.scheme, self.authority.host()),
            None => format!("{}://{}", self.scheme, self.authority.host()),
        }
    }

    /// Point a URI back at the real service
    ///
    /// # Errors
    ///
    /// Returns error if the rebuilt URI is invalid
    pub fn restore(&self, uri: &Uri) -> Result<Uri> {
        replace_origin(uri, self.scheme.clone(), self.authority.clone())
    }
}

/// Point a request at the proxy and tag it with session metadata
///
/// Path and query are kept. The `Host` header and the three recording
/// headers are overwritten.
///
/// # Errors
///
/// Returns error if the request URI is relative or a header value is invalid
pub fn rewrite_request<B>(
    request: &mut Request<B>,
    endpoint: &ProxyEndpoint,
    recording_id: &str,
) -> Result<InterceptContext> {
    let context = InterceptContext::capture(request.uri(), endpoint.mode, recording_id)?;

    let proxy_authority = Authority::try_from(endpoint.authority().as_str()).map_err(|e| {
        RecplayError::ConfigError(format!(
            "Invalid proxy authority '{}': {e}",
            endpoint.authority()
        ))
    })?;

    let host = header_value(proxy_authority.as_str())?;
    let upstream = header_value(&context.upstream_base_uri())?;
    let mode = header_value(context.mode.as_str())?;
    let recording_id = header_value(&context.recording_id)?;

    *request.uri_mut() = replace_origin(
        request.uri(),
        uri_scheme(endpoint.scheme),
        proxy_authority,
    )?;

    let headers = request.headers_mut();
    headers.insert(HOST, host);
    headers.insert(RECORDING_UPSTREAM_BASE_URI, upstream);
    headers.insert(RECORDING_MODE, mode);
    headers.insert(RECORDING_ID, recording_id);

    Ok(context)
}

/// Restore the response's back-reference to the request's original target
///
/// Responses without a [`RequestUri`] are left alone.
///
/// # Errors
///
/// Returns error if the rebuilt URI is invalid
pub fn restore_response<B>(response: &mut Response<B>, context: &InterceptContext) -> Result<()> {
    if let Some(RequestUri(uri)) = response.extensions_mut().get_mut::<RequestUri>() {
        *uri = context.restore(uri)?;
    }
    Ok(())
}

fn replace_origin(uri: &Uri, scheme: UriScheme, authority: Authority) -> Result<Uri> {
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(scheme);
    parts.authority = Some(authority);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    Uri::from_parts(parts)
        .map_err(|e| RecplayError::InvalidRequest(format!("Failed to rebuild URI '{uri}': {e}")))
}

fn uri_scheme(scheme: Scheme) -> UriScheme {
    match scheme {
        Scheme::Http => UriScheme::HTTP,
        Scheme::Https => UriScheme::HTTPS,
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| RecplayError::InvalidRequest(format!("Invalid header value '{value}': {e}")))
}
