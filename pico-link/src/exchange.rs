//! Runs logical operations against a device session

use std::time::Instant;

use proto::{
    frame, Command, Exchange, ExchangeConfig, ExchangeEvent, ExchangeFailure, Message,
    RetryConfig, RetryPlan, RetryStep,
};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, debug_span, trace, Instrument};

use crate::{
    endpoint::Endpoint,
    error::{Error, TransportError},
    session::{DeviceSession, Inbound},
};

/// Settings an operation runs with
pub(crate) struct Operation<'a> {
    pub(crate) pin: &'a str,
    pub(crate) exchange: &'a ExchangeConfig,
    pub(crate) retry: &'a RetryConfig,
}

/// How one exchange ended without a response
enum Attempt {
    Failed(ExchangeFailure),
    Transport(TransportError),
    Closed,
}

/// Send `command` until the device answers or the retry budget is spent
///
/// Each exchange draws a fresh IDP. Exchanges that fail are retried per the [`RetryPlan`];
/// crossing into a new outer attempt restarts the session counter from the beginning of its
/// range.
pub(crate) async fn execute(
    endpoint: &Endpoint,
    session: &DeviceSession,
    command: &Command,
    op: Operation<'_>,
) -> Result<Message, Error> {
    let span = debug_span!("operation", device = session.id(), cmd = command.name());
    async move {
        let payload = command.payload(op.pin);
        let mut plan = RetryPlan::new(op.retry, command.kind());
        let mut inbox = session.inbox().await;
        // Leftovers from abandoned operations can never match a fresh IDP
        while inbox.try_recv().is_ok() {}

        loop {
            let idp = session.next_idp();
            let outcome =
                exchange_once(endpoint, session, &mut inbox, &payload, idp, op.exchange).await;
            let failure = match outcome {
                Ok(response) => {
                    trace!(idp, exchanges = plan.exchanges() + 1, "operation complete");
                    return Ok(response);
                }
                Err(Attempt::Closed) => return Err(Error::SessionClosed),
                Err(Attempt::Transport(TransportError::Closed)) => {
                    return Err(TransportError::Closed.into())
                }
                Err(failure) => failure,
            };

            match plan.on_failure() {
                RetryStep::Retry {
                    delay,
                    reset_counter,
                } => {
                    match &failure {
                        Attempt::Failed(reason) => debug!(idp, %reason, "exchange failed"),
                        Attempt::Transport(e) => debug!(idp, "exchange failed: {}", e),
                        Attempt::Closed => {}
                    }
                    if reset_counter {
                        debug!(attempt = plan.attempt(), "starting new attempt");
                        session.reset_counter();
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryStep::GiveUp => {
                    return Err(match failure {
                        Attempt::Transport(e) => e.into(),
                        Attempt::Failed(last) => Error::Timeout {
                            device: session.id().to_owned(),
                            exchanges: plan.exchanges(),
                            last,
                        },
                        Attempt::Closed => Error::SessionClosed,
                    });
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Send one request and wait for its two-phase answer
async fn exchange_once(
    endpoint: &Endpoint,
    session: &DeviceSession,
    inbox: &mut mpsc::Receiver<Inbound>,
    payload: &Map<String, Value>,
    idp: u32,
    config: &ExchangeConfig,
) -> Result<Message, Attempt> {
    endpoint
        .send(session.remote(), frame::encode_request(payload, idp))
        .await
        .map_err(Attempt::Transport)?;
    trace!(idp, "request sent");

    let mut exchange = Exchange::new(idp, Instant::now(), config);
    while let Some(deadline) = exchange.poll_timeout() {
        tokio::select! {
            inbound = inbox.recv() => {
                let Some(inbound) = inbound else {
                    return Err(Attempt::Closed);
                };
                match exchange.handle(inbound.message, Instant::now()) {
                    Some(ExchangeEvent::Acknowledged) => trace!(idp, "acknowledged"),
                    Some(ExchangeEvent::Completed(response)) => {
                        let ack = frame::encode_ack(idp);
                        if let Err(e) = endpoint.send(session.remote(), ack).await {
                            debug!(idp, "failed to send closing ACK: {}", e);
                        }
                        return Ok(response);
                    }
                    None => trace!(idp, from = %inbound.from, "ignoring unrelated frame"),
                }
            }
            _ = tokio::time::sleep_until(deadline.into()) => {
                if let Some(failure) = exchange.handle_timeout(Instant::now()) {
                    return Err(Attempt::Failed(failure));
                }
            }
        }
    }
    Err(Attempt::Failed(ExchangeFailure::NoAck))
}
