//! State machine of a single request/response exchange
//!
//! An [`Exchange`] performs no I/O and never reads the clock: the caller feeds it the frames
//! it receives and the current time, asks [`Exchange::poll_timeout`] when to wake it next, and
//! calls [`Exchange::handle_timeout`] once that instant has passed.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::trace;

use crate::{
    config::ExchangeConfig,
    frame::{FrameKind, Message},
};

/// Progress of an [`Exchange`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    /// The request was transmitted and nothing has come back yet
    Sent,
    /// The device acknowledged the request; the payload is outstanding
    AckReceived,
    /// The payload arrived
    Complete,
    /// The exchange gave up
    Failed(ExchangeFailure),
}

/// Reasons a single exchange fails
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum ExchangeFailure {
    /// The response deadline passed without any frame for the exchange's IDP
    #[error("no acknowledgment received")]
    NoAck,
    /// The device acknowledged the request but never sent the payload
    #[error("acknowledged but no response followed")]
    AckWithoutFollowup,
    /// The response deadline passed while the payload was still expected
    #[error("response deadline elapsed")]
    Timeout,
}

/// Something an inbound frame did to an [`Exchange`]
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    /// The device acknowledged the request
    Acknowledged,
    /// The payload arrived; the caller should send the closing ACK
    Completed(Message),
}

/// One request awaiting its two-phase answer
#[derive(Debug)]
pub struct Exchange {
    idp: u32,
    state: ExchangeState,
    deadline: Instant,
    ack_deadline: Option<Instant>,
    ack_timeout: Duration,
}

impl Exchange {
    /// Start tracking a request stamped with `idp` that was transmitted at `now`
    pub fn new(idp: u32, now: Instant, config: &ExchangeConfig) -> Self {
        Self {
            idp,
            state: ExchangeState::Sent,
            deadline: now + config.response_timeout,
            ack_deadline: None,
            ack_timeout: config.ack_timeout,
        }
    }

    /// Process an inbound frame
    ///
    /// Frames for other IDPs, frames without a response code, and ACKs not sent by the
    /// device leave the exchange untouched.
    pub fn handle(&mut self, message: Message, now: Instant) -> Option<ExchangeEvent> {
        if self.is_finished() || message.idp() != Some(self.idp) {
            return None;
        }
        match message.kind() {
            FrameKind::Ack => {
                if self.state != ExchangeState::Sent {
                    trace!(idp = self.idp, "duplicate ACK");
                    return None;
                }
                self.state = ExchangeState::AckReceived;
                self.ack_deadline = Some(now + self.ack_timeout);
                Some(ExchangeEvent::Acknowledged)
            }
            FrameKind::Response => {
                self.state = ExchangeState::Complete;
                Some(ExchangeEvent::Completed(message))
            }
            FrameKind::Command | FrameKind::Other => None,
        }
    }

    /// The next instant at which [`handle_timeout`](Self::handle_timeout) must be called
    pub fn poll_timeout(&self) -> Option<Instant> {
        match self.state {
            ExchangeState::Sent => Some(self.deadline),
            ExchangeState::AckReceived => Some(match self.ack_deadline {
                Some(ack) => ack.min(self.deadline),
                None => self.deadline,
            }),
            ExchangeState::Complete | ExchangeState::Failed(_) => None,
        }
    }

    /// Fail the exchange if one of its deadlines has passed
    pub fn handle_timeout(&mut self, now: Instant) -> Option<ExchangeFailure> {
        let failure = match self.state {
            ExchangeState::Sent if now >= self.deadline => ExchangeFailure::NoAck,
            ExchangeState::AckReceived => match self.ack_deadline {
                Some(ack) if now >= ack => ExchangeFailure::AckWithoutFollowup,
                _ if now >= self.deadline => ExchangeFailure::Timeout,
                _ => return None,
            },
            _ => return None,
        };
        trace!(idp = self.idp, %failure, "exchange failed");
        self.state = ExchangeState::Failed(failure);
        Some(failure)
    }

    /// The IDP this exchange is waiting on
    pub fn idp(&self) -> u32 {
        self.idp
    }

    /// Current progress
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Whether the exchange reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            ExchangeState::Complete | ExchangeState::Failed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ExchangeConfig {
        let mut config = ExchangeConfig::default();
        config
            .response_timeout(Duration::from_secs(15))
            .ack_timeout(Duration::from_secs(3));
        config
    }

    fn frame(value: serde_json::Value) -> Message {
        Message::from_value(value).unwrap()
    }

    #[test]
    fn ack_then_response() {
        let now = Instant::now();
        let mut exchange = Exchange::new(5, now, &config());
        assert_eq!(
            exchange.handle(frame(json!({"idp": 5, "frm": "mst", "res": 99})), now),
            Some(ExchangeEvent::Acknowledged)
        );
        assert_eq!(exchange.state(), ExchangeState::AckReceived);
        assert_eq!(exchange.poll_timeout(), Some(now + Duration::from_secs(3)));
        let response = frame(json!({"idp": 5, "frm": "mst", "res": 1, "name": "Pico"}));
        assert_eq!(
            exchange.handle(response.clone(), now + Duration::from_secs(1)),
            Some(ExchangeEvent::Completed(response))
        );
        assert!(exchange.is_finished());
        assert_eq!(exchange.poll_timeout(), None);
    }

    #[test]
    fn response_without_ack() {
        let now = Instant::now();
        let mut exchange = Exchange::new(5, now, &config());
        assert!(matches!(
            exchange.handle(frame(json!({"idp": 5, "res": 1})), now),
            Some(ExchangeEvent::Completed(_))
        ));
    }

    #[test]
    fn unrelated_frames_ignored() {
        let now = Instant::now();
        let mut exchange = Exchange::new(5, now, &config());
        for value in [
            json!({"idp": 6, "frm": "mst", "res": 1}),
            json!({"idp": 5, "frm": "app", "res": 99}),
            json!({"idp": 5, "cmd": "evt"}),
            json!({"frm": "mst", "res": 1}),
        ] {
            assert_eq!(exchange.handle(frame(value), now), None);
        }
        assert_eq!(exchange.state(), ExchangeState::Sent);
    }

    #[test]
    fn no_ack() {
        let now = Instant::now();
        let mut exchange = Exchange::new(5, now, &config());
        assert_eq!(exchange.handle_timeout(now + Duration::from_secs(14)), None);
        assert_eq!(
            exchange.handle_timeout(now + Duration::from_secs(15)),
            Some(ExchangeFailure::NoAck)
        );
        assert_eq!(
            exchange.state(),
            ExchangeState::Failed(ExchangeFailure::NoAck)
        );
    }

    #[test]
    fn ack_without_followup() {
        let now = Instant::now();
        let mut exchange = Exchange::new(5, now, &config());
        let acked = now + Duration::from_secs(1);
        exchange.handle(frame(json!({"idp": 5, "frm": "mst", "res": 99})), acked);
        assert_eq!(exchange.handle_timeout(acked + Duration::from_secs(2)), None);
        assert_eq!(
            exchange.handle_timeout(acked + Duration::from_secs(3)),
            Some(ExchangeFailure::AckWithoutFollowup)
        );
    }

    #[test]
    fn late_ack_hits_primary_deadline() {
        let now = Instant::now();
        let mut exchange = Exchange::new(5, now, &config());
        let acked = now + Duration::from_secs(14);
        exchange.handle(frame(json!({"idp": 5, "frm": "mst", "res": 99})), acked);
        assert_eq!(exchange.poll_timeout(), Some(now + Duration::from_secs(15)));
        assert_eq!(
            exchange.handle_timeout(now + Duration::from_secs(15)),
            Some(ExchangeFailure::Timeout)
        );
    }

    #[test]
    fn duplicate_ack_keeps_window() {
        let now = Instant::now();
        let mut exchange = Exchange::new(5, now, &config());
        let ack = json!({"idp": 5, "frm": "mst", "res": 99});
        exchange.handle(frame(ack.clone()), now);
        assert_eq!(
            exchange.handle(frame(ack), now + Duration::from_secs(2)),
            None
        );
        assert_eq!(exchange.poll_timeout(), Some(now + Duration::from_secs(3)));
    }
}
