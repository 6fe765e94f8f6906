//! Reader availability and scan session state machine.
//!
//! [`ReaderSession`] combines the hardware [`ReaderState`] with the scan
//! session flag. It is a plain synchronous value; the
//! [`ReaderSessionController`](crate::ReaderSessionController) owns one and
//! is the only place it is mutated.
//!
//! # Transitions
//!
//! Hardware states follow `Unavailable → TurningOn → Available → TurningOff
//! → Unavailable`. Broadcasts can arrive out of order, so every change is
//! accepted; those that skip a step are flagged in the history and logged.
//!
//! ```
//! use tagrelay_core::ReaderState;
//! use tagrelay_reader::ReaderSession;
//!
//! let mut session = ReaderSession::new(false);
//! session.apply_hardware_state(ReaderState::TurningOn);
//! session.apply_hardware_state(ReaderState::Available);
//!
//! assert!(session.enable());
//! assert!(session.is_enabled());
//! assert_eq!(session.history().len(), 2);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tagrelay_core::{CardRecord, ReaderState};
use tracing::{debug, info, warn};

/// Maximum number of state transitions kept for diagnostics.
const MAX_HISTORY_SIZE: usize = 100;

/// Notification emitted by the reader side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderNotification {
    /// The hardware availability changed.
    ReaderStateChanged(ReaderState),

    /// A tag was decoded while the session was enabled.
    CardDiscovered {
        record: CardRecord,
        discovered_at: DateTime<Utc>,
    },
}

/// Record of a single hardware state change.
#[derive(Debug, Clone, Copy)]
pub struct StateTransition {
    pub from: ReaderState,
    pub to: ReaderState,
    /// `false` when the change skipped a step of the hardware ordering.
    pub in_order: bool,
    pub timestamp: Instant,
}

impl StateTransition {
    fn new(from: ReaderState, to: ReaderState) -> Self {
        Self {
            from,
            to,
            in_order: from.is_natural_successor(to),
            timestamp: Instant::now(),
        }
    }

    /// Time since the transition happened.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Hardware state plus scan session lifecycle.
#[derive(Debug)]
pub struct ReaderSession {
    state: ReaderState,
    enabled: bool,
    /// Enable was requested while the reader was not available.
    resume_pending: bool,
    resume_when_available: bool,
    history: VecDeque<StateTransition>,
}

impl ReaderSession {
    /// Create a session in `Unavailable` with scanning disabled.
    ///
    /// With `resume_when_available`, an enable request made while the reader
    /// is not available is remembered and applied once it becomes available.
    pub fn new(resume_when_available: bool) -> Self {
        Self {
            state: ReaderState::Unavailable,
            enabled: false,
            resume_pending: false,
            resume_when_available,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Returns `true` while tags are being accepted.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Apply a hardware broadcast.
    ///
    /// Returns the transition when the state actually changed, `None` for a
    /// repeat of the current state.
    pub fn apply_hardware_state(&mut self, new_state: ReaderState) -> Option<StateTransition> {
        if new_state == self.state {
            debug!(state = %new_state, "Repeated reader state ignored");
            return None;
        }

        let transition = StateTransition::new(self.state, new_state);
        if !transition.in_order {
            warn!(from = %transition.from, to = %transition.to, "Reader state changed out of order");
        }

        self.state = new_state;
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }

        if new_state.is_available() && self.resume_pending {
            self.resume_pending = false;
            self.enabled = true;
            info!("Scan session resumed on reader availability");
        } else if new_state == ReaderState::Unavailable && self.enabled {
            // The flag stays set; the surrounding lifecycle decides when to disable.
            debug!("Reader became unavailable with scan session enabled");
        }

        Some(transition)
    }

    /// Request scanning.
    ///
    /// Returns `true` if the session went from disabled to enabled. Enabling
    /// while the reader is not available does nothing (or is deferred when
    /// resuming is configured).
    pub fn enable(&mut self) -> bool {
        if self.enabled {
            return false;
        }

        if !self.state.is_available() {
            if self.resume_when_available {
                self.resume_pending = true;
                debug!(state = %self.state, "Scan session deferred until reader is available");
            } else {
                debug!(state = %self.state, "Scan session not enabled, reader unavailable");
            }
            return false;
        }

        self.enabled = true;
        true
    }

    /// Stop scanning. Always succeeds; returns `true` if it was enabled.
    pub fn disable(&mut self) -> bool {
        self.resume_pending = false;
        std::mem::replace(&mut self.enabled, false)
    }
}

impl Default for ReaderSession {
    fn default() -> Self {
        Self::new(false)
    }
}
