//! Per-request state: the retry state machine and the typed context bag

use crate::record::OutputRecord;
use std::fmt;

/// Lifecycle of one outbound request
///
/// `Sent -> RateLimited -> Sent (retry) -> ... -> Resolved | Abandoned`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Created, nothing sent yet
    Pending,

    /// An attempt is in flight
    Sent,

    /// Last attempt was answered with a rate-limit status
    RateLimited,

    /// A usable response arrived
    Resolved,

    /// Given up on; no response will be processed
    Abandoned,
}

impl RequestState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Abandoned)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Pending, Abandoned)
                | (Sent, RateLimited)
                | (Sent, Resolved)
                | (Sent, Abandoned)
                | (RateLimited, Sent)
                | (RateLimited, Abandoned)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::RateLimited => "rate_limited",
            Self::Resolved => "resolved",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable bag travelling with one request
///
/// Holds the attempt counter used by the retry policy and, for requests to
/// the secondary-detail stage, the partially built record.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    attempt: Option<u32>,
    state: Option<RequestState>,
    record: Option<OutputRecord>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying a partial record to the next stage
    pub fn with_record(record: OutputRecord) -> Self {
        Self {
            record: Some(record),
            ..Self::default()
        }
    }

    /// Current attempt number; 1 if the request was never sent
    pub fn attempt(&self) -> u32 {
        self.attempt.unwrap_or(1)
    }

    pub fn state(&self) -> RequestState {
        self.state.unwrap_or(RequestState::Pending)
    }

    /// Records that an attempt is going out; the first one initializes the
    /// attempt counter to 1
    pub fn mark_sent(&mut self) {
        if self.attempt.is_none() {
            self.attempt = Some(1);
        }
        self.transition(RequestState::Sent);
    }

    /// Records a rate-limit answer to the current attempt
    pub fn mark_rate_limited(&mut self) {
        self.transition(RequestState::RateLimited);
    }

    /// Moves the attempt counter forward before a retry
    pub fn advance_attempt(&mut self) -> u32 {
        let next = self.attempt() + 1;
        self.attempt = Some(next);
        next
    }

    pub fn resolve(&mut self) {
        self.transition(RequestState::Resolved);
    }

    pub fn abandon(&mut self) {
        self.transition(RequestState::Abandoned);
    }

    pub fn record(&self) -> Option<&OutputRecord> {
        self.record.as_ref()
    }

    /// Takes the carried record out of the context
    pub fn take_record(&mut self) -> Option<OutputRecord> {
        self.record.take()
    }

    fn transition(&mut self, next: RequestState) {
        let current = self.state();
        if current.can_transition_to(next) {
            self.state = Some(next);
        } else {
            debug_assert!(false, "invalid request transition {} -> {}", current, next);
            tracing::error!("Invalid request transition: {} -> {}", current, next);
        }
    }
}
