//! Transport that routes application traffic through the proxy

use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Request, Response};
use tracing::debug;

use crate::network::{RequestBody, ResponseBody, Transport};
use crate::session::Session;
use crate::Result;

use super::context::{restore_response, rewrite_request};

/// Drop-in [`Transport`] that sends every request to the proxy
///
/// Requests are tagged with the session's mode and recording id and the
/// real target travels in `x-recording-upstream-base-uri`. Responses come
/// back pointing at the real target again. Once the session is stopped,
/// sends fail instead of reaching the proxy.
#[derive(Clone)]
pub struct InterceptingTransport {
    inner: Arc<dyn Transport>,
    session: Session,
}

impl InterceptingTransport {
    /// Wrap a send primitive for a session
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>, session: Session) -> Self {
        Self { inner, session }
    }

    /// Session requests are tagged with
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl Transport for InterceptingTransport {
    async fn send(&self, mut request: Request<RequestBody>) -> Result<Response<ResponseBody>> {
        let recording_id = self.session.active_recording_id()?;
        let context = rewrite_request(&mut request, self.session.endpoint(), recording_id)?;

        debug!(
            "Routing {} {} via proxy (upstream {})",
            request.method(),
            request.uri(),
            context.upstream_base_uri()
        );

        let mut response = self.inner.send(request).await?;
        restore_response(&mut response, &context)?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, ProxyEndpoint};
    use crate::headers::{RECORDING_ID, RECORDING_MODE, RECORDING_UPSTREAM_BASE_URI};
    use crate::network::{boxed_body, empty_body, RequestUri};
    use crate::RecplayError;
    use serde_json::Map;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Echoes the request target back like a real client would
    #[derive(Default)]
    struct EchoClient {
        seen: Mutex<Vec<Request<()>>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for EchoClient {
        async fn send(&self, request: Request<RequestBody>) -> Result<Response<ResponseBody>> {
            if self.fail {
                return Err(RecplayError::InvalidRequest("connection refused".to_string()));
            }

            let (parts, _) = request.into_parts();
            let uri = parts.uri.clone();
            self.seen.lock().unwrap().push(Request::from_parts(parts, ()));

            let mut response = Response::new(boxed_body("{}"));
            response.extensions_mut().insert(RequestUri(uri));
            Ok(response)
        }
    }

    fn started_session() -> Session {
        let session = Session::new(
            ProxyEndpoint::new(Mode::Record),
            PathBuf::from("recordings/t.json"),
        )
        .unwrap();
        session.assign("abc123".to_string(), Map::new()).unwrap();
        session
    }

    fn get(uri: &str) -> Request<RequestBody> {
        Request::get(uri).body(empty_body()).unwrap()
    }

    #[tokio::test]
    async fn test_send_routes_and_restores() {
        let client = Arc::new(EchoClient::default());
        let transport = InterceptingTransport::new(client.clone(), started_session());

        let response = transport
            .send(get("https://service.example.com/foo"))
            .await
            .unwrap();

        assert_eq!(
            RequestUri::of(&response).unwrap().to_string(),
            "https://service.example.com/foo"
        );

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let forwarded = &seen[0];
        assert_eq!(forwarded.method(), "GET");
        assert_eq!(forwarded.uri().to_string(), "https://localhost:5001/foo");
        assert_eq!(
            forwarded.headers()[RECORDING_UPSTREAM_BASE_URI],
            "https://service.example.com"
        );
        assert_eq!(forwarded.headers()[RECORDING_MODE], "record");
        assert_eq!(forwarded.headers()[RECORDING_ID], "abc123");
    }

    #[tokio::test]
    async fn test_send_requires_started_session() {
        let client = Arc::new(EchoClient::default());
        let session = Session::new(
            ProxyEndpoint::new(Mode::Record),
            PathBuf::from("recordings/t.json"),
        )
        .unwrap();
        let transport = InterceptingTransport::new(client.clone(), session);

        let result = transport.send(get("https://service.example.com/")).await;

        assert!(matches!(result, Err(RecplayError::SessionNotStarted(_))));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_refused_after_stop() {
        let client = Arc::new(EchoClient::default());
        let session = started_session();
        let transport = InterceptingTransport::new(client.clone(), session.clone());

        assert!(session.mark_stopped());
        let result = transport.send(get("https://service.example.com/")).await;

        assert!(matches!(result, Err(RecplayError::SessionStopped(_))));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_propagates_transport_error() {
        let client = Arc::new(EchoClient {
            fail: true,
            ..EchoClient::default()
        });
        let transport = InterceptingTransport::new(client, started_session());

        let result = transport.send(get("https://service.example.com/")).await;

        match result {
            Err(RecplayError::InvalidRequest(msg)) => assert_eq!(msg, "connection refused"),
            other => panic!("unexpected result: {:?}", other.map(|r| r.status())),
        }
    }

    #[tokio::test]
    async fn test_sends_are_independent() {
        let client = Arc::new(EchoClient::default());
        let transport = InterceptingTransport::new(client.clone(), started_session());

        let first = transport
            .send(get("https://tables.example.com/Tables"))
            .await
            .unwrap();
        let second = transport
            .send(get("http://127.0.0.1:10002/queue/messages"))
            .await
            .unwrap();

        assert_eq!(
            RequestUri::of(&first).unwrap().to_string(),
            "https://tables.example.com/Tables"
        );
        assert_eq!(
            RequestUri::of(&second).unwrap().to_string(),
            "http://127.0.0.1:10002/queue/messages"
        );

        let seen = client.seen.lock().unwrap();
        assert_eq!(
            seen[1].headers()[RECORDING_UPSTREAM_BASE_URI],
            "http://127.0.0.1:10002"
        );
    }
}
