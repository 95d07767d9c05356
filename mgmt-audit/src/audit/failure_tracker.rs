//! Handler delivery failure tracking
//!
//! Counts failed deliveries and disables the handler once a configurable
//! threshold is reached. Three transitions clear the state: an explicit
//! recycle, a successful write over a re-established connection, and raising
//! the threshold above the current count. They are kept apart so that logs
//! and callers can tell them apart.

/// Delivery state of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Deliveries are attempted
    Active,
    /// Threshold reached; no deliveries until recycled
    Disabled,
}

/// What a recorded failure did to the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    /// Still active
    Counted,
    /// This failure reached the threshold
    Disabled,
}

/// Failure accounting for one handler
///
/// Not synchronized itself; the owning handler keeps it behind the same lock
/// as its transport so that accounting and the resource stay consistent.
#[derive(Debug)]
pub(crate) struct FailureTracker {
    handler: String,
    failure_count: u32,
    max_failure_count: u32,
    state: HandlerState,
    last_error: Option<String>,
}

impl FailureTracker {
    /// Create a tracker
    ///
    /// # Arguments
    ///
    /// * `handler` - Handler name for log fields
    /// * `max_failure_count` - Failures before disablement; 0 never disables
    pub(crate) fn new(handler: impl Into<String>, max_failure_count: u32) -> Self {
        Self {
            handler: handler.into(),
            failure_count: 0,
            max_failure_count,
            state: HandlerState::Active,
            last_error: None,
        }
    }

    pub(crate) fn state(&self) -> HandlerState {
        self.state
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.state == HandlerState::Disabled
    }

    pub(crate) fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub(crate) fn max_failure_count(&self) -> u32 {
        self.max_failure_count
    }

    pub(crate) fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn threshold_reached(&self) -> bool {
        self.max_failure_count > 0 && self.failure_count >= self.max_failure_count
    }

    /// Record a failed delivery
    pub(crate) fn record_failure(&mut self, error: &str) -> FailureOutcome {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_error = Some(error.to_string());

        if self.state == HandlerState::Active && self.threshold_reached() {
            self.state = HandlerState::Disabled;
            tracing::error!(
                handler = %self.handler,
                failure_count = self.failure_count,
                max_failure_count = self.max_failure_count,
                last_error = %error,
                "Audit handler disabled after repeated failures"
            );
            FailureOutcome::Disabled
        } else {
            tracing::warn!(
                handler = %self.handler,
                failure_count = self.failure_count,
                max_failure_count = self.max_failure_count,
                "Audit delivery failed: {}",
                error
            );
            FailureOutcome::Counted
        }
    }

    /// A write succeeded over a connection re-established after failures
    pub(crate) fn record_reconnect(&mut self) {
        if self.failure_count > 0 || self.state == HandlerState::Disabled {
            tracing::info!(
                handler = %self.handler,
                failure_count = self.failure_count,
                "Audit handler reconnected, failure count reset"
            );
        }
        self.clear();
    }

    /// Administrative recycle
    pub(crate) fn recycle(&mut self) {
        tracing::info!(
            handler = %self.handler,
            failure_count = self.failure_count,
            disabled = self.is_disabled(),
            "Audit handler recycled"
        );
        self.clear();
    }

    /// Change the threshold, re-evaluating the disabled state against it
    ///
    /// Returns the outcome when the new threshold disables the handler.
    pub(crate) fn set_max_failure_count(&mut self, max_failure_count: u32) -> Option<FailureOutcome> {
        self.max_failure_count = max_failure_count;
        match (self.state, self.threshold_reached()) {
            (HandlerState::Active, true) => {
                self.state = HandlerState::Disabled;
                tracing::error!(
                    handler = %self.handler,
                    failure_count = self.failure_count,
                    max_failure_count,
                    "Audit handler disabled by lowered failure threshold"
                );
                Some(FailureOutcome::Disabled)
            }
            (HandlerState::Disabled, false) => {
                self.state = HandlerState::Active;
                tracing::info!(
                    handler = %self.handler,
                    failure_count = self.failure_count,
                    max_failure_count,
                    "Audit handler re-enabled by raised failure threshold"
                );
                None
            }
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.failure_count = 0;
        self.state = HandlerState::Active;
        self.last_error = None;
    }
}
