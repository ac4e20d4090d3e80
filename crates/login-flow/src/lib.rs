//! Login wizard state machine for the desktop shell.
//!
//! The backend holds the authoritative authentication state; this crate
//! drives it. [`AuthSessionController`] runs the phone → code → password →
//! name sequence, publishes [`WizardSnapshot`]s over a watch channel, and
//! polls the backend so state changes from outside the wizard (another
//! device confirming the login, a session expiring) are picked up within a
//! second.

mod controller;
mod state;
pub mod validation;

pub use controller::{AuthSessionController, POLL_FAILURE_WARN_THRESHOLD, POLL_INTERVAL};
pub use state::{ConfirmedUser, WizardSnapshot, WizardStep};
pub use validation::ValidationError;
