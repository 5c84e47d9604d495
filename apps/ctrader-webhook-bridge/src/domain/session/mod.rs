//! Broker Session State Machine
//!
//! The session has exactly one owner (the session manager task). Everything
//! else observes it through [`SessionStatus`] snapshots.
//!
//! # Transitions
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Authenticating ──► Ready
//!      ▲               │              │               │  │           │
//!      └───────────────┴──────────────┴───────────────┘  │           │
//!      ▲                                                 ▼           │
//!      │                                             Degraded        │
//!      └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Degraded` is terminal.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport; a reconnect may be scheduled.
    #[default]
    Disconnected,
    /// Transport handshake in progress.
    Connecting,
    /// Transport open, not yet authenticated.
    Connected,
    /// Application or account authentication in flight.
    Authenticating,
    /// Authenticated; orders may be submitted.
    Ready,
    /// Credentials rejected repeatedly. No further attempts are made.
    Degraded,
}

impl SessionState {
    /// Lower-case state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        }
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Disconnected)
                | (Self::Connected, Self::Authenticating | Self::Disconnected)
                | (
                    Self::Authenticating,
                    Self::Ready | Self::Disconnected | Self::Degraded
                )
                | (Self::Ready, Self::Disconnected)
        )
    }

    /// Whether the session can accept orders.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Whether a transport connection is open in this state.
    #[must_use]
    pub const fn has_transport(self) -> bool {
        matches!(self, Self::Connected | Self::Authenticating | Self::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the two-step authentication is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Waiting for the application auth response.
    Application,
    /// Waiting for the trading account auth response.
    Account,
}

/// Illegal state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition: {from} -> {to}")]
pub struct TransitionError {
    /// State before the attempted transition.
    pub from: SessionState,
    /// Requested state.
    pub to: SessionState,
}

// =============================================================================
// Session
// =============================================================================

/// Mutable session record owned by the session manager.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    last_error: Option<String>,
    retry_count: u32,
    backoff_deadline: Option<Instant>,
    auth_stage: Option<AuthStage>,
    auth_failures: u32,
}

impl Session {
    /// Create a disconnected session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Most recent failure description.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Consecutive failed connection attempts since the last `Ready`.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// When the next connection attempt is due.
    #[must_use]
    pub const fn backoff_deadline(&self) -> Option<Instant> {
        self.backoff_deadline
    }

    /// Outstanding authentication step, if authenticating.
    #[must_use]
    pub const fn auth_stage(&self) -> Option<AuthStage> {
        self.auth_stage
    }

    /// Consecutive credential rejections.
    #[must_use]
    pub const fn auth_failures(&self) -> u32 {
        self.auth_failures
    }

    /// Move to `next`, returning the previous state.
    ///
    /// Entering `Authenticating` starts at the application stage; leaving it
    /// clears the stage. Entering `Ready` resets the failure counters and
    /// the last error. Entering `Connecting` clears the backoff deadline.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the transition is not allowed.
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState, TransitionError> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }

        self.state = next;
        self.auth_stage = match next {
            SessionState::Authenticating => Some(AuthStage::Application),
            _ => None,
        };

        match next {
            SessionState::Connecting => self.backoff_deadline = None,
            SessionState::Ready => {
                self.retry_count = 0;
                self.auth_failures = 0;
                self.last_error = None;
            }
            _ => {}
        }

        Ok(from)
    }

    /// Application auth acknowledged; account auth is now outstanding.
    pub const fn advance_auth(&mut self) {
        if matches!(self.auth_stage, Some(AuthStage::Application)) {
            self.auth_stage = Some(AuthStage::Account);
        }
    }

    /// Record a failure description for status reporting.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Count a failed attempt and schedule the next one at `deadline`.
    ///
    /// Returns the number of consecutive failures before this one, which is
    /// the exponent for the backoff delay.
    pub fn schedule_retry(&mut self, deadline: Instant) -> u32 {
        let previous = self.retry_count;
        self.retry_count = self.retry_count.saturating_add(1);
        self.backoff_deadline = Some(deadline);
        previous
    }

    /// Count a credential rejection, returning the new consecutive total.
    pub const fn record_auth_rejection(&mut self) -> u32 {
        self.auth_failures = self.auth_failures.saturating_add(1);
        self.auth_failures
    }

    /// Snapshot for observers.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
            test_mode: false,
        }
    }
}

// =============================================================================
// Status Snapshot
// =============================================================================

/// Read-only view of the session published to HTTP handlers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Session state.
    pub state: SessionState,
    /// Consecutive failed attempts.
    pub retry_count: u32,
    /// Most recent failure description.
    pub last_error: Option<String>,
    /// Whether this is the offline stub session.
    pub test_mode: bool,
}

impl SessionStatus {
    /// Status reported by the offline stub session.
    #[must_use]
    pub const fn test_mode() -> Self {
        Self {
            state: SessionState::Ready,
            retry_count: 0,
            last_error: None,
            test_mode: true,
        }
    }

    /// Whether orders are accepted.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}
