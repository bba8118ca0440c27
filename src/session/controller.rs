//! Start/stop protocol against the proxy

use std::sync::Arc;

use hyper::header::CONTENT_TYPE;
use hyper::{Request, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::headers::{RECORDING_FILE_KEY, RECORDING_ID, RECORDING_SAVE};
use crate::network::{body_text, empty_body, full_body, read_body, Transport};
use crate::{RecplayError, Result};

use super::Session;

/// Issues lifecycle calls to the proxy
///
/// The client is injected so the same connection pool and TLS settings
/// serve both lifecycle calls and routed traffic.
#[derive(Clone)]
pub struct SessionController {
    client: Arc<dyn Transport>,
}

impl SessionController {
    /// Create a controller over the given client
    #[must_use]
    pub fn new(client: Arc<dyn Transport>) -> Self {
        Self { client }
    }

    /// The client lifecycle calls go through
    #[must_use]
    pub fn client(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.client)
    }

    /// Start a record or playback session
    ///
    /// POSTs the recording file path to `/{mode}/start` and stores the
    /// recording id the proxy answers with.
    ///
    /// # Errors
    ///
    /// Returns error if the session was already started or stopped, the
    /// call fails, no recording id comes back, or the body is not a JSON object
    pub async fn start(&self, session: &Session) -> Result<()> {
        if session.is_stopped() {
            return Err(RecplayError::SessionStopped(
                "cannot start a stopped session".to_string(),
            ));
        }

        if let Some(id) = session.recording_id() {
            return Err(RecplayError::SessionAlreadyStarted(id.to_string()));
        }

        let recording_file = session.recording_file().ok_or_else(|| {
            RecplayError::InvalidRequest("session has no recording file to start".to_string())
        })?;

        let url = session.endpoint().action_url("start");
        let mut payload = Map::new();
        payload.insert(
            RECORDING_FILE_KEY.to_string(),
            Value::String(recording_file.to_string_lossy().into_owned()),
        );

        let request = Request::post(url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(full_body(serde_json::to_vec(&payload)?))?;

        info!(
            "Starting {} session for {}",
            session.mode(),
            recording_file.display()
        );

        let response = self.client.send(request).await?;
        let (parts, body) = response.into_parts();

        let recording_id = parts
            .headers
            .get(RECORDING_ID)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let body = read_body(body).await?;

        let Some(recording_id) = recording_id else {
            warn!("Proxy at {url} answered {} without a recording id", parts.status);
            return Err(RecplayError::RecordingIdMissing {
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        };

        let variables = if body.iter().all(u8::is_ascii_whitespace) {
            Map::new()
        } else {
            serde_json::from_slice::<Map<String, Value>>(&body)?
        };

        debug!(
            "Proxy returned {} session variable(s) for {recording_id}",
            variables.len()
        );

        session.assign(recording_id, variables)?;

        info!(
            "Started {} session {}",
            session.mode(),
            session.recording_id().unwrap_or_default()
        );
        Ok(())
    }

    /// Stop a session and ask the proxy to save the recording
    ///
    /// The session refuses routed requests from this point on, even if the
    /// call fails. A recording is only persisted when this succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if the session was never started or already stopped,
    /// the call fails, or the proxy answers with anything but 200
    pub async fn stop(&self, session: &Session) -> Result<()> {
        let recording_id = session
            .recording_id()
            .ok_or_else(|| {
                RecplayError::SessionNotStarted("stop requires a started session".to_string())
            })?
            .to_string();

        if !session.mark_stopped() {
            return Err(RecplayError::SessionStopped(recording_id));
        }

        let url = session.endpoint().action_url("stop");
        let request = Request::post(url.as_str())
            .header(RECORDING_ID, recording_id.as_str())
            .header(RECORDING_SAVE, "true")
            .body(empty_body())?;

        info!("Stopping {} session {recording_id}", session.mode());

        let response = self.client.send(request).await?;
        let status = response.status();

        if status != StatusCode::OK {
            let body = match body_text(response.into_body()).await {
                Ok(text) => text,
                Err(e) => e.to_string(),
            };
            warn!("Proxy failed to stop session {recording_id}: {status}");
            return Err(RecplayError::StopFailed { status, body });
        }

        read_body(response.into_body()).await?;

        info!("Stopped session {recording_id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, ProxyEndpoint};
    use crate::network::{boxed_body, RequestBody, ResponseBody};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use hyper::Response;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records requests and answers with canned responses
    struct ScriptedProxy {
        seen: Mutex<Vec<(Request<()>, Vec<u8>)>>,
        replies: Mutex<Vec<Response<ResponseBody>>>,
    }

    impl ScriptedProxy {
        fn new(replies: Vec<Response<ResponseBody>>) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into_iter().rev().collect()),
            })
        }

        fn seen(&self) -> Vec<(Request<()>, Vec<u8>)> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    #[async_trait]
    impl Transport for ScriptedProxy {
        async fn send(&self, request: Request<RequestBody>) -> Result<Response<ResponseBody>> {
            let (parts, body) = request.into_parts();
            let bytes = body.collect().await.unwrap().to_bytes().to_vec();
            self.seen
                .lock()
                .unwrap()
                .push((Request::from_parts(parts, ()), bytes));
            Ok(self.replies.lock().unwrap().pop().expect("unexpected request"))
        }
    }

    fn reply(status: u16, recording_id: Option<&str>, body: &str) -> Response<ResponseBody> {
        let mut builder = Response::builder().status(status);
        if let Some(id) = recording_id {
            builder = builder.header("x-recording-id", id);
        }
        builder.body(boxed_body(body.to_string())).unwrap()
    }

    fn session(mode: Mode) -> Session {
        let endpoint = ProxyEndpoint {
            host: "localhost".to_string(),
            port: 5001,
            scheme: crate::config::Scheme::Https,
            mode,
        };
        Session::new(endpoint, PathBuf::from("/work/recordings/TestTables.json")).unwrap()
    }

    #[tokio::test]
    async fn test_start_assigns_recording_id() {
        let proxy = ScriptedProxy::new(vec![reply(200, Some("abc123"), "")]);
        let controller = SessionController::new(proxy.clone());
        let session = session(Mode::Record);

        controller.start(&session).await.unwrap();

        assert_eq!(session.recording_id(), Some("abc123"));
        assert!(session.variables().unwrap().is_empty());

        let seen = proxy.seen();
        assert_eq!(seen.len(), 1);
        let (request, body) = &seen[0];
        assert_eq!(request.method(), "POST");
        assert_eq!(
            request.uri().to_string(),
            "https://localhost:5001/record/start"
        );
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");

        let payload: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({"x-recording-file": "/work/recordings/TestTables.json"})
        );
    }

    #[tokio::test]
    async fn test_start_keeps_session_variables() {
        let proxy = ScriptedProxy::new(vec![reply(
            200,
            Some("abc123"),
            r#"{"seed": 42, "account": "dev"}"#,
        )]);
        let controller = SessionController::new(proxy);
        let session = session(Mode::Playback);

        controller.start(&session).await.unwrap();

        let variables = session.variables().unwrap();
        assert_eq!(variables["seed"], 42);
        assert_eq!(variables["account"], "dev");
    }

    #[tokio::test]
    async fn test_start_without_recording_id_fails() {
        for body in ["", "no session for you", r#"{"x-recording-id": "abc"}"#] {
            let proxy = ScriptedProxy::new(vec![reply(200, None, body)]);
            let controller = SessionController::new(proxy);
            let session = session(Mode::Record);

            let err = controller.start(&session).await.unwrap_err();
            match &err {
                RecplayError::RecordingIdMissing { body: text } => assert_eq!(text, body),
                other => panic!("unexpected error: {other}"),
            }
            assert!(err.to_string().contains("recording ID was not returned"));
            assert!(!session.is_started());
        }
    }

    #[tokio::test]
    async fn test_start_with_malformed_json_fails() {
        let proxy = ScriptedProxy::new(vec![reply(200, Some("abc123"), "{not json")]);
        let controller = SessionController::new(proxy);
        let session = session(Mode::Record);

        let result = controller.start(&session).await;
        assert!(matches!(result, Err(RecplayError::Json(_))));
        assert!(!session.is_started());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let proxy = ScriptedProxy::new(vec![reply(200, Some("abc123"), "")]);
        let controller = SessionController::new(proxy.clone());
        let session = session(Mode::Record);

        controller.start(&session).await.unwrap();
        let result = controller.start(&session).await;

        assert!(matches!(result, Err(RecplayError::SessionAlreadyStarted(_))));
        assert_eq!(proxy.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_sends_save_directive() {
        let proxy = ScriptedProxy::new(vec![reply(200, Some("abc123"), ""), reply(200, None, "")]);
        let controller = SessionController::new(proxy.clone());
        let session = session(Mode::Record);

        controller.start(&session).await.unwrap();
        controller.stop(&session).await.unwrap();

        assert!(session.is_stopped());

        let seen = proxy.seen();
        let (request, body) = &seen[1];
        assert_eq!(request.method(), "POST");
        assert_eq!(
            request.uri().to_string(),
            "https://localhost:5001/record/stop"
        );
        assert_eq!(request.headers()[RECORDING_ID], "abc123");
        assert_eq!(request.headers()[RECORDING_SAVE], "true");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_stop_non_200_embeds_body() {
        let proxy = ScriptedProxy::new(vec![
            reply(200, Some("abc123"), ""),
            reply(500, None, "disk full"),
        ]);
        let controller = SessionController::new(proxy);
        let session = session(Mode::Record);

        controller.start(&session).await.unwrap();
        let err = controller.stop(&session).await.unwrap_err();

        match &err {
            RecplayError::StopFailed { status, body } => {
                assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("disk full"));
        assert!(session.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_rejects_other_success_codes() {
        let proxy = ScriptedProxy::new(vec![
            reply(200, Some("abc123"), ""),
            reply(204, None, ""),
        ]);
        let controller = SessionController::new(proxy);
        let session = session(Mode::Playback);

        controller.start(&session).await.unwrap();
        assert!(matches!(
            controller.stop(&session).await,
            Err(RecplayError::StopFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_requires_start() {
        let proxy = ScriptedProxy::new(vec![]);
        let controller = SessionController::new(proxy.clone());
        let session = session(Mode::Record);

        let result = controller.stop(&session).await;
        assert!(matches!(result, Err(RecplayError::SessionNotStarted(_))));
        assert!(proxy.seen().is_empty());
    }

    #[tokio::test]
    async fn test_session_not_reusable_after_stop() {
        let proxy = ScriptedProxy::new(vec![reply(200, Some("abc123"), ""), reply(200, None, "")]);
        let controller = SessionController::new(proxy.clone());
        let session = session(Mode::Record);

        controller.start(&session).await.unwrap();
        controller.stop(&session).await.unwrap();

        assert!(matches!(
            controller.stop(&session).await,
            Err(RecplayError::SessionStopped(_))
        ));
        assert!(matches!(
            controller.start(&session).await,
            Err(RecplayError::SessionStopped(_))
        ));
        assert_eq!(proxy.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_resumed_session() {
        let proxy = ScriptedProxy::new(vec![reply(200, None, "")]);
        let controller = SessionController::new(proxy.clone());
        let endpoint = session(Mode::Playback).endpoint().clone();
        let session = Session::resume(endpoint, "abc123").unwrap();

        controller.stop(&session).await.unwrap();

        let seen = proxy.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0.uri().to_string(),
            "https://localhost:5001/playback/stop"
        );
        assert_eq!(seen[0].0.headers()[RECORDING_ID], "abc123");
    }
}
