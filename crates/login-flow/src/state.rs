//! Local view state of the login wizard.
//!
//! The server owns the authoritative flow state; the structs here are the
//! client-side projection of it. [`SessionState`] is the controller's
//! mutable guts, [`WizardSnapshot`] the immutable view published to
//! renderers.

use backend_gateway::ServerAuthState;
use tokio::task::JoinHandle;

/// Which screen of the wizard is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    /// No session. The wizard is closed or was cancelled.
    Init,
    Phone,
    Code,
    Password,
    /// Authenticated; waiting for the local account name.
    Name,
    Success,
    Error,
}

impl WizardStep {
    /// Steps from which the flow cannot advance without a new `start()`.
    pub fn is_terminal(self) -> bool {
        matches!(self, WizardStep::Success | WizardStep::Error)
    }
}

/// The authenticated user, once the server reports `ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedUser {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// Immutable view of the wizard published to subscribers.
///
/// Everything a renderer needs is here; the controller exposes no other
/// read surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardSnapshot {
    pub step: WizardStep,
    /// Whether a live session token is held.
    pub has_token: bool,
    /// Per-input validation failure on the current step.
    pub field_error: Option<String>,
    /// Flow-level failure (backend rejection, preflight, finalize error).
    pub flow_error: Option<String>,
    /// Hint for the two-factor password, when the server supplies one.
    pub password_hint: Option<String>,
    pub user: Option<ConfirmedUser>,
    /// Current value of the account-name input.
    pub account_label: String,
    /// Sustained poll failures; the session itself is still live.
    pub connectivity_warning: bool,
}

impl Default for WizardSnapshot {
    fn default() -> Self {
        Self {
            step: WizardStep::Init,
            has_token: false,
            field_error: None,
            flow_error: None,
            password_hint: None,
            user: None,
            account_label: String::new(),
            connectivity_warning: false,
        }
    }
}

/// API credential overrides captured at `start()` and replayed on `retry()`.
#[derive(Debug, Clone, Default)]
pub(crate) struct CredentialOverrides {
    pub api_id: Option<i64>,
    pub api_hash: Option<String>,
}

/// Mutable session state guarded by the controller's mutex.
pub(crate) struct SessionState {
    /// Bumped by every `start()` and `cancel()`. Async work captures the
    /// value and discards its result if the counter moved on.
    pub generation: u64,
    pub token: Option<String>,
    pub step: WizardStep,
    pub password_hint: Option<String>,
    pub user: Option<ConfirmedUser>,
    pub account_label: String,
    /// One-shot: the label default from `first_name` is applied once per
    /// session, never again, so later polls cannot clobber user edits.
    pub label_defaulted: bool,
    pub field_error: Option<String>,
    pub flow_error: Option<String>,
    pub connectivity_warning: bool,
    pub poll_failures: u32,
    pub overrides: CredentialOverrides,
    pub poll_task: Option<JoinHandle<()>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            generation: 0,
            token: None,
            step: WizardStep::Init,
            password_hint: None,
            user: None,
            account_label: String::new(),
            label_defaulted: false,
            field_error: None,
            flow_error: None,
            connectivity_warning: false,
            poll_failures: 0,
            overrides: CredentialOverrides::default(),
            poll_task: None,
        }
    }

    /// Clear everything except the generation counter.
    pub fn reset(&mut self) {
        let generation = self.generation;
        *self = Self::new();
        self.generation = generation;
    }

    /// Fold an authoritative server state into the local view.
    ///
    /// Idempotent: applying the same state twice leaves the session
    /// unchanged, including inline errors. The poll re-reports the current
    /// state every second, so clearing errors belongs to an actual step
    /// change, never to reapplication. `closed` is ignored; it only ever
    /// arrives late, after the local side already moved on.
    pub fn apply_server_state(&mut self, state: ServerAuthState) {
        match state {
            ServerAuthState::NotStarted | ServerAuthState::WaitingPhoneNumber => {
                self.enter_step(WizardStep::Phone);
            }
            ServerAuthState::WaitingCode { .. } => {
                self.enter_step(WizardStep::Code);
            }
            ServerAuthState::WaitingPassword { password_hint } => {
                self.enter_step(WizardStep::Password);
                self.password_hint = if password_hint.is_empty() {
                    None
                } else {
                    Some(password_hint)
                };
            }
            ServerAuthState::Ready {
                user_id,
                first_name,
                last_name,
                phone,
            } => {
                if !self.label_defaulted {
                    self.account_label = first_name.clone();
                    self.label_defaulted = true;
                }
                self.user = Some(ConfirmedUser {
                    user_id,
                    first_name,
                    last_name,
                    phone,
                });
                self.enter_step(WizardStep::Name);
            }
            ServerAuthState::Error { message } => {
                self.step = WizardStep::Error;
                self.flow_error = Some(message);
            }
            ServerAuthState::Closed => {}
        }
    }

    /// Move to `step`, clearing inline errors only when the step actually
    /// changes. Re-entering the current step is a no-op.
    fn enter_step(&mut self, step: WizardStep) {
        if self.step != step {
            self.step = step;
            self.field_error = None;
            self.flow_error = None;
        }
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        WizardSnapshot {
            step: self.step,
            has_token: self.token.is_some(),
            field_error: self.field_error.clone(),
            flow_error: self.flow_error.clone(),
            password_hint: self.password_hint.clone(),
            user: self.user.clone(),
            account_label: self.account_label.clone(),
            connectivity_warning: self.connectivity_warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_state() -> ServerAuthState {
        ServerAuthState::Ready {
            user_id: 42,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: "+441234567".to_string(),
        }
    }

    #[test]
    fn applying_same_state_twice_is_idempotent() {
        let mut session = SessionState::new();
        session.apply_server_state(ready_state());
        let first = session.snapshot();
        session.apply_server_state(ready_state());
        assert_eq!(session.snapshot(), first);
    }

    #[test]
    fn label_default_is_applied_only_once() {
        let mut session = SessionState::new();
        session.apply_server_state(ready_state());
        assert_eq!(session.account_label, "Ada");

        // User edits the label; a later poll reporting the same state must
        // not clobber it.
        session.account_label = "Work account".to_string();
        session.apply_server_state(ready_state());
        assert_eq!(session.account_label, "Work account");
    }

    #[test]
    fn closed_state_changes_nothing() {
        let mut session = SessionState::new();
        session.apply_server_state(ServerAuthState::WaitingCode {
            phone_number: "+441234567".to_string(),
        });
        let before = session.snapshot();
        session.apply_server_state(ServerAuthState::Closed);
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn not_started_maps_to_phone_step() {
        let mut session = SessionState::new();
        session.apply_server_state(ServerAuthState::NotStarted);
        assert_eq!(session.step, WizardStep::Phone);
    }

    #[test]
    fn error_state_carries_message() {
        let mut session = SessionState::new();
        session.apply_server_state(ServerAuthState::Error {
            message: "flood wait".to_string(),
        });
        assert_eq!(session.step, WizardStep::Error);
        assert_eq!(session.flow_error.as_deref(), Some("flood wait"));
        assert!(session.step.is_terminal());
    }

    #[test]
    fn empty_password_hint_becomes_none() {
        let mut session = SessionState::new();
        session.apply_server_state(ServerAuthState::WaitingPassword {
            password_hint: String::new(),
        });
        assert_eq!(session.step, WizardStep::Password);
        assert!(session.password_hint.is_none());
    }

    #[test]
    fn successful_transition_clears_stale_errors() {
        let mut session = SessionState::new();
        session.field_error = Some("Phone number is too long".to_string());
        session.flow_error = Some("previous failure".to_string());
        session.apply_server_state(ServerAuthState::WaitingCode {
            phone_number: "+441234567".to_string(),
        });
        assert!(session.field_error.is_none());
        assert!(session.flow_error.is_none());
    }

    #[test]
    fn reapplying_current_state_preserves_inline_submit_error() {
        let mut session = SessionState::new();
        session.apply_server_state(ServerAuthState::WaitingPhoneNumber);
        session.flow_error = Some("The phone number is invalid".to_string());

        // The poll re-reports the unchanged server state every second; the
        // inline error must survive until the step actually moves.
        session.apply_server_state(ServerAuthState::WaitingPhoneNumber);

        assert_eq!(session.step, WizardStep::Phone);
        assert_eq!(
            session.flow_error.as_deref(),
            Some("The phone number is invalid")
        );
    }

    #[test]
    fn reapplying_current_state_preserves_field_error() {
        let mut session = SessionState::new();
        let waiting_code = ServerAuthState::WaitingCode {
            phone_number: "+441234567".to_string(),
        };
        session.apply_server_state(waiting_code.clone());
        session.field_error = Some("Verification code is required".to_string());

        session.apply_server_state(waiting_code);

        assert_eq!(session.step, WizardStep::Code);
        assert_eq!(
            session.field_error.as_deref(),
            Some("Verification code is required")
        );
    }

    #[test]
    fn reset_preserves_generation() {
        let mut session = SessionState::new();
        session.generation = 7;
        session.token = Some("tok".to_string());
        session.apply_server_state(ready_state());
        session.reset();
        assert_eq!(session.generation, 7);
        assert!(session.token.is_none());
        assert_eq!(session.step, WizardStep::Init);
        assert!(!session.label_defaulted);
    }
}
