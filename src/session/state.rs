//! Session state shared between the controller and the transport

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use crate::config::{Mode, ProxyEndpoint};
use crate::{RecplayError, Result};

use super::RECORDINGS_DIR;

/// One record/playback run against the proxy
///
/// A cheap handle; clones observe the same state. The recording id is
/// written once by [`SessionController::start`](super::SessionController::start)
/// and read by every routed request, so no lock is needed.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    endpoint: ProxyEndpoint,
    recording_file: Option<PathBuf>,
    recording_id: OnceLock<String>,
    variables: OnceLock<Map<String, Value>>,
    stopped: AtomicBool,
}

impl Session {
    /// Create a session that has not been started yet
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is invalid
    pub fn new(endpoint: ProxyEndpoint, recording_file: PathBuf) -> Result<Self> {
        Self::build(endpoint, Some(recording_file))
    }

    fn build(endpoint: ProxyEndpoint, recording_file: Option<PathBuf>) -> Result<Self> {
        endpoint.validate()?;

        Ok(Self {
            inner: Arc::new(SessionState {
                endpoint,
                recording_file,
                recording_id: OnceLock::new(),
                variables: OnceLock::new(),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Create a session whose recording lives at `<root>/recordings/<test_name>.json`
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint or test name is invalid
    pub fn for_test(endpoint: ProxyEndpoint, root: &Path, test_name: &str) -> Result<Self> {
        Self::new(endpoint, recording_file_path(root, test_name)?)
    }

    /// Attach to a session another process already started
    ///
    /// Only the id is known, so the session has no recording file and can
    /// only be stopped or used to route requests.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is invalid or the id is empty
    pub fn resume(endpoint: ProxyEndpoint, recording_id: &str) -> Result<Self> {
        if recording_id.trim().is_empty() {
            return Err(RecplayError::SessionNotStarted(
                "recording id cannot be empty".to_string(),
            ));
        }

        let session = Self::build(endpoint, None)?;
        session.assign(recording_id.to_string(), Map::new())?;
        Ok(session)
    }

    /// Proxy connection parameters
    #[must_use]
    pub fn endpoint(&self) -> &ProxyEndpoint {
        &self.inner.endpoint
    }

    /// Session mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.endpoint.mode
    }

    /// Path of the recording artifact; `None` for resumed sessions
    #[must_use]
    pub fn recording_file(&self) -> Option<&Path> {
        self.inner.recording_file.as_deref()
    }

    /// Recording id, once started
    #[must_use]
    pub fn recording_id(&self) -> Option<&str> {
        self.inner.recording_id.get().map(String::as_str)
    }

    /// Variables the proxy returned on start
    #[must_use]
    pub fn variables(&self) -> Option<&Map<String, Value>> {
        self.inner.variables.get()
    }

    /// Whether start has succeeded
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.recording_id.get().is_some()
    }

    /// Whether stop has been issued
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Recording id of a session that may still route requests
    ///
    /// # Errors
    ///
    /// Returns error if the session was never started or is stopped
    pub fn active_recording_id(&self) -> Result<&str> {
        if self.is_stopped() {
            return Err(RecplayError::SessionStopped(self.describe()));
        }

        self.recording_id()
            .ok_or_else(|| RecplayError::SessionNotStarted(self.describe()))
    }

    /// Store the id and variables handed out by the proxy
    pub(crate) fn assign(&self, recording_id: String, variables: Map<String, Value>) -> Result<()> {
        self.inner
            .recording_id
            .set(recording_id)
            .map_err(|_| RecplayError::SessionAlreadyStarted(self.describe()))?;

        // Only the winner of the id race gets here
        let _ = self.inner.variables.set(variables);
        Ok(())
    }

    /// Mark the session stopped; returns false if it already was
    pub(crate) fn mark_stopped(&self) -> bool {
        !self.inner.stopped.swap(true, Ordering::AcqRel)
    }

    fn describe(&self) -> String {
        match self.recording_file() {
            Some(file) => format!(
                "{} session for {} (recording id: {})",
                self.mode(),
                file.display(),
                self.recording_id().unwrap_or("<none>")
            ),
            None => format!(
                "{} session (recording id: {})",
                self.mode(),
                self.recording_id().unwrap_or("<none>")
            ),
        }
    }
}

/// Path of the recording artifact for a test
///
/// `/` in the test name is kept so sub-tests land in sub-directories. The
/// root must be absolute: the proxy resolves the path in its own working
/// directory.
///
/// # Errors
///
/// Returns error if the root is relative or the test name is invalid
pub fn recording_file_path(root: &Path, test_name: &str) -> Result<PathBuf> {
    if !root.is_absolute() {
        return Err(RecplayError::ConfigError(format!(
            "Recording root '{}' must be absolute",
            root.display()
        )));
    }

    validate_test_name(test_name)?;
    Ok(root.join(RECORDINGS_DIR).join(format!("{test_name}.json")))
}

/// Validate a test name
///
/// # Errors
///
/// Returns error if test name is invalid
fn validate_test_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RecplayError::InvalidTestName(
            "Test name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(RecplayError::InvalidTestName(format!(
            "Test name too long: {} > 255",
            name.len()
        )));
    }

    if name.starts_with('/') || name.contains('\\') {
        return Err(RecplayError::InvalidTestName(
            "Test name cannot be absolute or contain backslashes".to_string(),
        ));
    }

    if name.starts_with('.') {
        return Err(RecplayError::InvalidTestName(
            "Test name cannot start with dot".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(RecplayError::InvalidTestName(
            "Test name cannot contain null bytes".to_string(),
        ));
    }

    if name.contains("..") {
        return Err(RecplayError::InvalidTestName(
            "Test name cannot contain '..'".to_string(),
        ));
    }

    Ok(())
}
