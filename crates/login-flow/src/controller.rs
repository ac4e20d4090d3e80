//! Driver for the server-held login state machine.
//!
//! [`AuthSessionController`] owns one login session at a time. Every
//! operation resolves to a published [`WizardSnapshot`]; none of them
//! return errors to the caller. The server state is authoritative: the
//! controller only ever advances the wizard by folding in what the backend
//! reports, either as a direct response to a step submission or through the
//! background poll.

use crate::state::{CredentialOverrides, SessionState, WizardSnapshot, WizardStep};
use crate::validation::{validate_account_label, validate_code, validate_phone};
use backend_gateway::{BackendHandle, GatewayError, LoginStartResult};
use retry_policy::{retry, RetryPolicy};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How often the background task polls the server-side session state.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive poll failures before the snapshot raises a connectivity
/// warning. The warning clears on the next successful poll.
pub const POLL_FAILURE_WARN_THRESHOLD: u32 = 5;

/// Field error shown when the chosen account name is already in use.
const NAME_TAKEN_MESSAGE: &str = "An account with this name already exists";

struct Shared {
    backend: BackendHandle,
    state: Mutex<SessionState>,
    snapshot_tx: watch::Sender<WizardSnapshot>,
    retry_policy: RetryPolicy,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }

    /// Publish the current state to all snapshot subscribers.
    fn publish(&self) {
        let snapshot = self.lock().snapshot();
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Orchestrates the login wizard against a [`backend_gateway::LoginBackend`].
///
/// The controller is the only writer of wizard state. Renderers subscribe
/// via [`AuthSessionController::subscribe`] and react to snapshots; they
/// never see backend types or raw errors.
pub struct AuthSessionController {
    shared: Arc<Shared>,
}

impl AuthSessionController {
    pub fn new(backend: BackendHandle) -> Self {
        Self::with_retry_policy(backend, RetryPolicy::default())
    }

    /// Use a custom retry policy for the read-only preflight and
    /// duplicate-name checks. Step submissions are never retried.
    pub fn with_retry_policy(backend: BackendHandle, retry_policy: RetryPolicy) -> Self {
        let (snapshot_tx, _) = watch::channel(WizardSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                backend,
                state: Mutex::new(SessionState::new()),
                snapshot_tx,
                retry_policy,
            }),
        }
    }

    /// Watch the wizard state. The receiver always holds the latest
    /// snapshot; intermediate states may be skipped under load.
    pub fn subscribe(&self) -> watch::Receiver<WizardSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// The current snapshot, without subscribing.
    pub fn snapshot(&self) -> WizardSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Begin a fresh login session, discarding any previous one.
    ///
    /// Runs the preflight check first; a blocking finding moves the wizard
    /// to `Error` with the joined blocking messages and no session is
    /// created. On success the wizard lands on the phone step and the
    /// background poll starts.
    pub async fn start(&self, api_id: Option<i64>, api_hash: Option<String>) {
        let generation = {
            let mut session = self.shared.lock();
            if let Some(task) = session.poll_task.take() {
                task.abort();
            }
            session.generation += 1;
            session.reset();
            session.overrides = CredentialOverrides {
                api_id,
                api_hash: api_hash.clone(),
            };
            session.generation
        };
        self.shared.publish();

        let backend = Arc::clone(&self.shared.backend);
        let hash_for_check = api_hash.clone();
        let preflight = retry(
            &self.shared.retry_policy,
            GatewayError::is_transient,
            move || {
                let backend = Arc::clone(&backend);
                let api_hash = hash_for_check.clone();
                async move { backend.check_can_login(api_id, api_hash).await }
            },
        )
        .await;

        match preflight {
            Err(err) => {
                warn!(error = %err, "login preflight failed");
                self.fail_start(generation, err.user_message());
                return;
            }
            Ok(report) if !report.can_proceed => {
                info!("login blocked by preflight checks");
                self.fail_start(generation, report.blocking_summary());
                return;
            }
            Ok(_) => {}
        }

        match self.shared.backend.login_start(api_id, api_hash).await {
            Ok(LoginStartResult { token, state }) => {
                {
                    let mut session = self.shared.lock();
                    if session.generation != generation {
                        // Superseded while the request was in flight.
                        // Release the orphan session server-side.
                        release_session(&self.shared.backend, token);
                        return;
                    }
                    debug!(generation, "login session started");
                    session.token = Some(token);
                    session.apply_server_state(state);
                }
                self.shared.publish();
                self.spawn_poll(generation);
            }
            Err(err) => {
                warn!(error = %err, "login session start failed");
                self.fail_start(generation, err.user_message());
            }
        }
    }

    /// Submit the phone number. Invalid input sets a field error locally
    /// and never reaches the backend.
    pub async fn submit_phone(&self, phone: &str) {
        let phone = match validate_phone(phone) {
            Ok(phone) => phone,
            Err(err) => {
                self.set_field_error(err.message);
                return;
            }
        };
        let Some((token, generation)) = self.submit_context(WizardStep::Phone) else {
            return;
        };
        let result = self.shared.backend.login_send_phone(&token, &phone).await;
        self.finish_submit(generation, result);
    }

    /// Submit the verification code.
    pub async fn submit_code(&self, code: &str) {
        let code = match validate_code(code) {
            Ok(code) => code,
            Err(err) => {
                self.set_field_error(err.message);
                return;
            }
        };
        let Some((token, generation)) = self.submit_context(WizardStep::Code) else {
            return;
        };
        let result = self.shared.backend.login_send_code(&token, &code).await;
        self.finish_submit(generation, result);
    }

    /// Submit the two-factor password. Beyond requiring a value, the
    /// password is passed through verbatim; the server is the only judge
    /// of its content.
    pub async fn submit_password(&self, password: &str) {
        if password.is_empty() {
            self.set_field_error("Password is required".to_string());
            return;
        }
        let Some((token, generation)) = self.submit_context(WizardStep::Password) else {
            return;
        };
        let result = self
            .shared
            .backend
            .login_send_password(&token, password)
            .await;
        self.finish_submit(generation, result);
    }

    /// Finalize the session under the given account name.
    ///
    /// Checks name uniqueness first; a taken name sets a field error and
    /// finalize is not attempted. A finalize failure is terminal for the
    /// session and moves the wizard to `Error`.
    pub async fn complete(
        &self,
        account_label: &str,
        api_id: Option<i64>,
        api_hash: Option<String>,
    ) {
        let label = match validate_account_label(account_label) {
            Ok(label) => label,
            Err(err) => {
                self.set_field_error(err.message);
                return;
            }
        };
        let Some((token, generation)) = self.submit_context(WizardStep::Name) else {
            return;
        };

        let backend = Arc::clone(&self.shared.backend);
        let name_for_check = label.clone();
        let exists = retry(
            &self.shared.retry_policy,
            GatewayError::is_transient,
            move || {
                let backend = Arc::clone(&backend);
                let name = name_for_check.clone();
                async move { backend.check_account_name_exists(&name).await }
            },
        )
        .await;

        match exists {
            Ok(true) => {
                let mut session = self.shared.lock();
                if session.generation == generation {
                    session.field_error = Some(NAME_TAKEN_MESSAGE.to_string());
                    drop(session);
                    self.shared.publish();
                }
                return;
            }
            Ok(false) => {}
            Err(err) => {
                // Recoverable: the user can retry the name step.
                warn!(error = %err, "duplicate-name check failed");
                let mut session = self.shared.lock();
                if session.generation == generation {
                    session.flow_error = Some(err.user_message());
                    drop(session);
                    self.shared.publish();
                }
                return;
            }
        }

        match self
            .shared
            .backend
            .login_complete(&token, &label, api_id, api_hash)
            .await
        {
            Ok(record) => {
                let mut session = self.shared.lock();
                if session.generation != generation {
                    return;
                }
                info!(account_id = record.id, "login flow completed");
                session.step = WizardStep::Success;
                session.token = None;
                session.account_label = record.account_name;
                session.field_error = None;
                session.flow_error = None;
                drop(session);
                self.shared.publish();
            }
            Err(err) => {
                warn!(error = %err, "login finalize failed");
                let mut session = self.shared.lock();
                if session.generation != generation {
                    return;
                }
                session.step = WizardStep::Error;
                session.flow_error = Some(err.user_message());
                drop(session);
                self.shared.publish();
            }
        }
    }

    /// Abandon the current session.
    ///
    /// Local state is cleared synchronously; the server-side release is
    /// fire-and-forget. Any in-flight response for the old session is
    /// discarded when it lands.
    pub fn cancel(&self) {
        let token = {
            let mut session = self.shared.lock();
            session.generation += 1;
            if let Some(task) = session.poll_task.take() {
                task.abort();
            }
            let token = session.token.take();
            session.reset();
            token
        };
        self.shared.publish();

        if let Some(token) = token {
            debug!("login session cancelled");
            release_session(&self.shared.backend, token);
        }
    }

    /// Restart the flow after a failure, reusing the credential overrides
    /// from the failed attempt. Ignored unless the wizard is on `Error`.
    pub async fn retry(&self) {
        let overrides = {
            let session = self.shared.lock();
            if session.step != WizardStep::Error {
                warn!(step = ?session.step, "retry ignored outside error step");
                return;
            }
            session.overrides.clone()
        };
        self.start(overrides.api_id, overrides.api_hash).await;
    }

    fn set_field_error(&self, message: String) {
        self.shared.lock().field_error = Some(message);
        self.shared.publish();
    }

    /// Token and generation for a step submission, or `None` when the
    /// wizard is not on the expected step. Clears the field error so a
    /// previous validation failure does not outlive the new attempt.
    fn submit_context(&self, expected: WizardStep) -> Option<(String, u64)> {
        let mut session = self.shared.lock();
        if session.step != expected {
            warn!(step = ?session.step, expected = ?expected, "submission ignored on wrong step");
            return None;
        }
        session.field_error = None;
        let token = session.token.clone()?;
        Some((token, session.generation))
    }

    /// Fold a step-submission result into the session, unless the session
    /// has been superseded in the meantime.
    fn finish_submit(
        &self,
        generation: u64,
        result: Result<backend_gateway::ServerAuthState, GatewayError>,
    ) {
        let mut session = self.shared.lock();
        if session.generation != generation {
            debug!("discarding stale submission response");
            return;
        }
        match result {
            Ok(state) => session.apply_server_state(state),
            Err(err) => {
                // Step submissions fail inline; the step does not change
                // and the user can correct the input.
                session.flow_error = Some(err.user_message());
            }
        }
        drop(session);
        self.shared.publish();
    }

    fn fail_start(&self, generation: u64, message: String) {
        let mut session = self.shared.lock();
        if session.generation != generation {
            return;
        }
        session.step = WizardStep::Error;
        session.flow_error = Some(message);
        drop(session);
        self.shared.publish();
    }

    fn spawn_poll(&self, generation: u64) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; the session state was just
            // fetched, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let token = {
                    let session = shared.lock();
                    if session.generation != generation || session.step.is_terminal() {
                        return;
                    }
                    match &session.token {
                        Some(token) => token.clone(),
                        None => return,
                    }
                };
                match shared.backend.login_get_state(&token).await {
                    Ok(state) => {
                        let done = {
                            let mut session = shared.lock();
                            if session.generation != generation {
                                return;
                            }
                            session.poll_failures = 0;
                            session.connectivity_warning = false;
                            session.apply_server_state(state);
                            session.step.is_terminal()
                        };
                        shared.publish();
                        if done {
                            return;
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "session state poll failed");
                        let newly_degraded = {
                            let mut session = shared.lock();
                            if session.generation != generation {
                                return;
                            }
                            session.poll_failures += 1;
                            if session.poll_failures >= POLL_FAILURE_WARN_THRESHOLD
                                && !session.connectivity_warning
                            {
                                session.connectivity_warning = true;
                                true
                            } else {
                                false
                            }
                        };
                        if newly_degraded {
                            warn!(
                                failures = POLL_FAILURE_WARN_THRESHOLD,
                                "sustained poll failures, raising connectivity warning"
                            );
                            shared.publish();
                        }
                    }
                }
            }
        });

        let mut session = self.shared.lock();
        if session.generation == generation {
            session.poll_task = Some(handle);
        } else {
            handle.abort();
        }
    }
}

impl Drop for AuthSessionController {
    fn drop(&mut self) {
        if let Ok(mut session) = self.shared.state.lock() {
            if let Some(task) = session.poll_task.take() {
                task.abort();
            }
        }
    }
}

/// Fire-and-forget server-side session release.
fn release_session(backend: &BackendHandle, token: String) {
    let backend = Arc::clone(backend);
    tokio::spawn(async move {
        if let Err(err) = backend.login_cancel(&token).await {
            debug!(error = %err, "session release failed");
        }
    });
}
