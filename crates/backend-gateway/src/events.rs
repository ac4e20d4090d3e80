//! Push-event channel from the backend.
//!
//! The backend fans out typed notifications (status changes, detections,
//! log lines, tray commands) to any number of frontend subscribers. There
//! is no acknowledgement; a slow subscriber drops the oldest events and
//! the gap is logged.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

// Channel names. Each name is an independent subscription key.
pub const CHANNEL_ACCOUNT_STATUS: &str = "account-status";
pub const CHANNEL_PHASE_DETECTED: &str = "phase-detected";
pub const CHANNEL_ACTION_DETECTED: &str = "action-detected";
pub const CHANNEL_JOIN_ATTEMPT: &str = "join-attempt";
pub const CHANNEL_ACCOUNT_LOG: &str = "account-log";
pub const CHANNEL_REGEX_VALIDATION_ERROR: &str = "regex-validation-error";
pub const CHANNEL_LOGIN_PROGRESS: &str = "login-progress";
pub const CHANNEL_TRAY_COMMAND: &str = "tray-command";

/// Default capacity of the fan-out buffer per bus.
const DEFAULT_BUS_CAPACITY: usize = 256;

// ============================================================================
// Event payloads
// ============================================================================

/// Account status changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatusEvent {
    pub account_id: i64,
    /// "stopped", "starting", "running", "stopping", "error"
    pub status: String,
    pub message: Option<String>,
}

/// A game phase was detected for an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDetectedEvent {
    pub account_id: i64,
    pub account_name: String,
    pub phase_name: String,
    pub timestamp: String,
}

/// An automated action was detected/performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDetectedEvent {
    pub account_id: i64,
    pub account_name: String,
    pub action_name: String,
    pub button_clicked: Option<String>,
    pub timestamp: String,
}

/// A group-join attempt finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinAttemptEvent {
    pub account_id: i64,
    pub account_name: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub success: bool,
    pub timestamp: String,
}

/// Per-account log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLogEvent {
    pub account_id: i64,
    pub account_name: String,
    /// "info", "warn", "error", "debug"
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// A stored pattern failed to compile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegexValidationEvent {
    /// "phase", "action", "ban_patterns"
    pub scope: String,
    pub pattern: String,
    pub error: String,
}

/// Progress feedback while a login session is being set up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginProgressEvent {
    pub token: String,
    pub step: String,
    pub message: String,
    /// 0-100
    pub progress: u8,
}

/// Command originating from the system tray.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrayCommandEvent {
    pub command: String,
    pub account_id: Option<i64>,
}

// ============================================================================
// Envelope and bus
// ============================================================================

/// A single push notification: channel name plus raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub channel: String,
    pub payload: serde_json::Value,
}

impl PushEvent {
    pub fn new(channel: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }

    /// Deserialize the payload into a typed event struct.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Many-to-many fan-out of backend push notifications.
///
/// Cloning the bus is cheap; all clones share the same underlying channel.
/// Delivery is best-effort: if no subscriber exists the event is dropped,
/// and a subscriber that falls behind loses the oldest events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PushEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new listener. Events published before this call are not
    /// observed.
    pub fn listen(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    /// Publish a raw envelope. Returns the number of listeners reached.
    pub fn publish(&self, event: PushEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!("push event dropped (no subscribers)");
                0
            }
        }
    }

    /// Serialize a typed payload onto a named channel.
    pub fn publish_typed<T: Serialize>(&self, channel: &str, payload: &T) -> usize {
        match serde_json::to_value(payload) {
            Ok(value) => self.publish(PushEvent::new(channel, value)),
            Err(err) => {
                debug!(channel, error = %err, "failed to serialize push event");
                0
            }
        }
    }

    pub fn publish_account_status(&self, event: &AccountStatusEvent) -> usize {
        self.publish_typed(CHANNEL_ACCOUNT_STATUS, event)
    }

    pub fn publish_phase_detected(&self, event: &PhaseDetectedEvent) -> usize {
        self.publish_typed(CHANNEL_PHASE_DETECTED, event)
    }

    pub fn publish_action_detected(&self, event: &ActionDetectedEvent) -> usize {
        self.publish_typed(CHANNEL_ACTION_DETECTED, event)
    }

    pub fn publish_join_attempt(&self, event: &JoinAttemptEvent) -> usize {
        self.publish_typed(CHANNEL_JOIN_ATTEMPT, event)
    }

    pub fn publish_account_log(&self, event: &AccountLogEvent) -> usize {
        self.publish_typed(CHANNEL_ACCOUNT_LOG, event)
    }

    pub fn publish_regex_validation(&self, event: &RegexValidationEvent) -> usize {
        self.publish_typed(CHANNEL_REGEX_VALIDATION_ERROR, event)
    }

    pub fn publish_login_progress(&self, event: &LoginProgressEvent) -> usize {
        self.publish_typed(CHANNEL_LOGIN_PROGRESS, event)
    }

    pub fn publish_tray_command(&self, event: &TrayCommandEvent) -> usize {
        self.publish_typed(CHANNEL_TRAY_COMMAND, event)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Current timestamp in the RFC 3339 format used by event payloads.
pub fn event_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
