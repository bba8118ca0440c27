//! Scoped sessions: start on entry, stop on every way out

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use futures_util::FutureExt;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::intercept::InterceptingTransport;
use crate::network::Transport;
use crate::session::{Session, SessionController};
use crate::Result;

/// A started session and the transport routed through it
///
/// Call [`ActiveSession::stop`] when done. Dropping it without stopping
/// leaves the proxy session open and the recording unsaved.
pub struct ActiveSession {
    controller: SessionController,
    session: Session,
    transport: Arc<InterceptingTransport>,
}

impl ActiveSession {
    /// The underlying session
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Transport to hand to the application
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Stop the session and save the recording
    ///
    /// # Errors
    ///
    /// Returns error if the proxy did not stop the session
    pub async fn stop(self) -> Result<()> {
        self.controller.stop(&self.session).await
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if self.session.is_started() && !self.session.is_stopped() {
            warn!(
                "Session {} dropped without stop; {} will not be saved",
                self.session.recording_id().unwrap_or_default(),
                self.session
                    .recording_file()
                    .map_or_else(|| "its recording".to_string(), |f| f.display().to_string())
            );
        }
    }
}

/// Start a session and wrap `client` in an intercepting transport for it
///
/// # Errors
///
/// Returns error if the start call fails
pub async fn start_session(
    controller: &SessionController,
    session: Session,
) -> Result<ActiveSession> {
    controller.start(&session).await?;

    let transport = Arc::new(InterceptingTransport::new(
        controller.client(),
        session.clone(),
    ));

    Ok(ActiveSession {
        controller: controller.clone(),
        session,
        transport,
    })
}

/// Run `body` inside a proxy session named after `test_name`
///
/// When the configuration routes through the proxy, the session is started
/// first (a start failure is returned and `body` never runs) and stopped
/// afterwards whether `body` succeeded, failed or panicked. Both a body
/// failure and a stop failure are reported. Otherwise `body` gets `client`
/// as is and no lifecycle calls are made.
///
/// # Errors
///
/// Returns the body's error, the start or stop error, or both
///
/// # Panics
///
/// Resumes a panic from `body` after the session was stopped
pub async fn with_session<F, Fut, T>(
    client: Arc<dyn Transport>,
    config: &Config,
    test_name: &str,
    body: F,
) -> anyhow::Result<T>
where
    F: FnOnce(Arc<dyn Transport>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if !config.routes_through_proxy() {
        debug!("Proxy not in use for {test_name}, running {}", config.proxy.mode);
        return body(client).await;
    }

    let controller = SessionController::new(client);
    let session = Session::for_test(config.proxy.clone(), &config.recording_root, test_name)?;
    let active = start_session(&controller, session)
        .await
        .with_context(|| format!("failed to start proxy session for {test_name}"))?;

    let outcome = AssertUnwindSafe(body(active.transport()))
        .catch_unwind()
        .await;
    let stopped = active.stop().await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(panic) => {
            if let Err(e) = stopped {
                error!("Stopping session for {test_name} after panic failed: {e}");
            }
            std::panic::resume_unwind(panic);
        }
    };

    match (outcome, stopped) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(stop)) => Err(anyhow::Error::new(stop)
            .context(format!("failed to stop proxy session for {test_name}"))),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(stop)) => {
            Err(e.context(format!("stopping the proxy session also failed: {stop}")))
        }
    }
}
