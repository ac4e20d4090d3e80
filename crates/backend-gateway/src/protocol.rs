//! Wire-visible payloads for the login command boundary.
//!
//! The authentication flow is a server-held state machine; the client only
//! ever sees [`ServerAuthState`], a tagged union describing which input the
//! server is waiting for. Pre-flight checks report environment problems
//! before any session exists.

use serde::{Deserialize, Serialize};

/// Authoritative login-flow state as reported by the backend.
///
/// Every step submission and every poll returns one of these; the client
/// maps them to its local wizard step and never advances on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum ServerAuthState {
    #[serde(rename = "not_started")]
    NotStarted,
    #[serde(rename = "waiting_phone_number")]
    WaitingPhoneNumber,
    #[serde(rename = "waiting_code")]
    WaitingCode { phone_number: String },
    #[serde(rename = "waiting_password")]
    WaitingPassword { password_hint: String },
    #[serde(rename = "ready")]
    Ready {
        user_id: i64,
        first_name: String,
        last_name: String,
        phone: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "closed")]
    Closed,
}

/// Response to a session-start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginStartResult {
    /// Opaque token binding all subsequent calls to this session.
    pub token: String,
    /// Initial server state.
    pub state: ServerAuthState,
}

/// Account record returned when the login flow is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: i64,
    pub account_name: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub user_id: Option<i64>,
}

/// A single pre-flight check finding, with a stable code for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightIssue {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    /// If true, the checked operation cannot proceed.
    pub is_blocking: bool,
}

impl PreflightIssue {
    pub fn blocking(code: &str, message: &str, details: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: details.map(String::from),
            is_blocking: true,
        }
    }

    pub fn warning(code: &str, message: &str, details: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: details.map(String::from),
            is_blocking: false,
        }
    }
}

/// Aggregated result of pre-flight checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub can_proceed: bool,
    pub issues: Vec<PreflightIssue>,
}

impl PreflightReport {
    /// A report with no findings.
    pub fn success() -> Self {
        Self {
            can_proceed: true,
            issues: Vec::new(),
        }
    }

    pub fn add_issue(&mut self, issue: PreflightIssue) {
        if issue.is_blocking {
            self.can_proceed = false;
        }
        self.issues.push(issue);
    }

    pub fn merge(&mut self, other: PreflightReport) {
        if !other.can_proceed {
            self.can_proceed = false;
        }
        self.issues.extend(other.issues);
    }

    pub fn has_blocking(&self) -> bool {
        self.issues.iter().any(|i| i.is_blocking)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| !i.is_blocking)
    }

    /// All blocking messages joined into one user-visible string.
    pub fn blocking_summary(&self) -> String {
        self.issues
            .iter()
            .filter(|i| i.is_blocking)
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for PreflightReport {
    fn default() -> Self {
        Self::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_state_deserializes_from_tagged_json() {
        let state: ServerAuthState =
            serde_json::from_str(r#"{"state":"waiting_phone_number"}"#).unwrap();
        assert_eq!(state, ServerAuthState::WaitingPhoneNumber);

        let state: ServerAuthState =
            serde_json::from_str(r#"{"state":"waiting_password","password_hint":"my hint"}"#)
                .unwrap();
        assert_eq!(
            state,
            ServerAuthState::WaitingPassword {
                password_hint: "my hint".to_string()
            }
        );

        let state: ServerAuthState = serde_json::from_str(
            r#"{"state":"ready","user_id":42,"first_name":"Ada","last_name":"Lovelace","phone":"+441234567"}"#,
        )
        .unwrap();
        assert!(matches!(state, ServerAuthState::Ready { user_id: 42, .. }));
    }

    #[test]
    fn server_state_serializes_with_tag() {
        let json = serde_json::to_value(ServerAuthState::Error {
            message: "flood wait".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["message"], "flood wait");
    }

    #[test]
    fn report_merge_propagates_blocking() {
        let mut first = PreflightReport::success();
        first.add_issue(PreflightIssue::warning("WARN1", "Warning 1", None));

        let mut second = PreflightReport::success();
        second.add_issue(PreflightIssue::blocking("ERR1", "Error 1", None));

        first.merge(second);

        assert!(!first.can_proceed);
        assert_eq!(first.issues.len(), 2);
        assert!(first.has_blocking());
        assert!(first.has_warnings());
    }

    #[test]
    fn blocking_summary_skips_warnings() {
        let mut report = PreflightReport::success();
        report.add_issue(PreflightIssue::warning("W", "just a warning", None));
        report.add_issue(PreflightIssue::blocking("B1", "API credentials missing", None));
        report.add_issue(PreflightIssue::blocking("B2", "Worker not found", None));

        assert_eq!(
            report.blocking_summary(),
            "API credentials missing\nWorker not found"
        );
    }

    #[test]
    fn issue_constructors_set_blocking_flag() {
        let blocking = PreflightIssue::blocking("CODE", "Message", Some("Details"));
        assert!(blocking.is_blocking);
        assert!(blocking.details.is_some());

        let warning = PreflightIssue::warning("CODE", "Message", None);
        assert!(!warning.is_blocking);
        assert!(warning.details.is_none());
    }
}
