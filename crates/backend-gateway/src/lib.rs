//! Command/event boundary between the frontend core and the backend process.
//!
//! The frontend never speaks a transport directly. Commands go through the
//! [`LoginBackend`] trait (implemented over IPC by the application shell,
//! and by mocks in tests); push notifications arrive on the [`EventBus`].
//! Errors are normalized to user-visible message strings before they reach
//! any view state.

mod error;
pub mod events;
pub mod logging;
mod protocol;

pub use error::{GatewayError, GatewayResult};
pub use events::{EventBus, PushEvent};
pub use protocol::{
    AccountRecord, LoginStartResult, PreflightIssue, PreflightReport, ServerAuthState,
};

use async_trait::async_trait;
use std::sync::Arc;

/// Commands the backend exposes for the login flow.
///
/// All operations are transport-agnostic; the token binds a call sequence
/// to one server-held login session.
#[async_trait]
pub trait LoginBackend: Send + Sync {
    /// Pre-flight check: can a login be attempted at all?
    async fn check_can_login(
        &self,
        api_id_override: Option<i64>,
        api_hash_override: Option<String>,
    ) -> GatewayResult<PreflightReport>;

    /// Create a new login session.
    async fn login_start(
        &self,
        api_id: Option<i64>,
        api_hash: Option<String>,
    ) -> GatewayResult<LoginStartResult>;

    /// Fetch the current server-side state of a session.
    async fn login_get_state(&self, token: &str) -> GatewayResult<ServerAuthState>;

    /// Submit the phone number step.
    async fn login_send_phone(&self, token: &str, phone: &str) -> GatewayResult<ServerAuthState>;

    /// Submit the verification code step.
    async fn login_send_code(&self, token: &str, code: &str) -> GatewayResult<ServerAuthState>;

    /// Submit the two-factor password step.
    async fn login_send_password(
        &self,
        token: &str,
        password: &str,
    ) -> GatewayResult<ServerAuthState>;

    /// Finalize the session into a stored account record.
    async fn login_complete(
        &self,
        token: &str,
        account_label: &str,
        api_id_override: Option<i64>,
        api_hash_override: Option<String>,
    ) -> GatewayResult<AccountRecord>;

    /// Release a session. Best-effort; callers may discard the result.
    async fn login_cancel(&self, token: &str) -> GatewayResult<()>;

    /// Whether an account with this label already exists locally.
    async fn check_account_name_exists(&self, name: &str) -> GatewayResult<bool>;
}

/// Shared handle to the backend boundary.
pub type BackendHandle = Arc<dyn LoginBackend>;
