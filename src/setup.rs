// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Setup
//!
//! One-time handshake that makes a logical exchange publishable:
//!
//! 1. open a connection (`Connecting`)
//! 2. declare the exchange, and for direct exchanges declare the auxiliary
//!    queue and bind it (`Declaring`)
//! 3. hand back a record for the registry (`Ready`)
//!
//! Every step races against the connection's event stream. The first error,
//! whether returned by a step or reported by the connection, fails the setup
//! (`Failed`). Once ready, [`monitor`] keeps draining the events for the
//! lifetime of the connection.

use crate::{
    configs::AmqpConfigs,
    errors::AmqpError,
    registry::ExchangeRecord,
    topology::ProducerTopology,
    transport::{ConnectionEvent, Transport, TransportSession},
};
use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Progress of a setup handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    Connecting,
    Declaring,
    Ready,
    Failed,
}

/// A finished handshake: the record to cache and the events still to watch.
pub(crate) struct SetupOutcome {
    pub(crate) record: ExchangeRecord,
    pub(crate) events: UnboundedReceiver<ConnectionEvent>,
}

/// Drives the setup handshake for one logical exchange name.
pub(crate) struct ExchangeSetup {
    cfg: Arc<AmqpConfigs>,
    plan: ProducerTopology,
    state: SetupState,
}

impl ExchangeSetup {
    /// Validates the configuration and plans the declarations for `name`.
    ///
    /// Fails before any connection is attempted when reconnection is not
    /// enabled, the name is empty or the exchange type is unknown.
    pub(crate) fn new(cfg: Arc<AmqpConfigs>, name: &str) -> Result<ExchangeSetup, AmqpError> {
        if !cfg.impl_options.reconnect {
            error!("configuration error: implementation options - reconnect must be true");
            return Err(AmqpError::ConfigurationError);
        }

        let plan = ProducerTopology::new(name, &cfg.producer).map_err(|err| {
            error!(error = err.to_string(), exchange = name, "invalid exchange setup");
            err
        })?;

        Ok(ExchangeSetup {
            cfg,
            plan,
            state: SetupState::Connecting,
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.plan.name()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SetupState {
        self.state
    }

    /// Runs the handshake to completion, bounded by the configured setup timeout.
    pub(crate) async fn run(
        &mut self,
        transport: Arc<dyn Transport>,
    ) -> Result<SetupOutcome, AmqpError> {
        let result = match self.cfg.impl_options.setup_timeout_ms {
            Some(ms) => {
                let bounded =
                    tokio::time::timeout(Duration::from_millis(ms), self.handshake(transport))
                        .await;
                bounded.unwrap_or_else(|_| {
                    Err(AmqpError::Timeout(format!(
                        "setup of exchange `{}` took longer than {}ms",
                        self.plan.full_name(),
                        ms
                    )))
                })
            }
            None => self.handshake(transport).await,
        };

        match result {
            Ok(outcome) => {
                self.transition(SetupState::Ready);
                Ok(outcome)
            }
            Err(err) => {
                self.transition(SetupState::Failed);
                error!(
                    error = err.to_string(),
                    exchange = self.plan.full_name(),
                    "exchange setup failed"
                );
                Err(err)
            }
        }
    }

    async fn handshake(&mut self, transport: Arc<dyn Transport>) -> Result<SetupOutcome, AmqpError> {
        self.transition(SetupState::Connecting);
        let TransportSession {
            connection,
            mut events,
        } = transport.connect(&self.cfg.options).await?;

        info!(
            exchange = self.plan.full_name(),
            host = self.cfg.options.host.as_str(),
            "connection ready"
        );

        self.transition(SetupState::Declaring);
        let plan = &self.plan;

        until_ready(
            plan.full_name(),
            &mut events,
            connection.declare_exchange(plan.exchange()),
        )
        .await?;
        info!(exchange = plan.full_name(), "exchange ready");

        if let Some((queue, binding)) = plan.queue() {
            until_ready(plan.full_name(), &mut events, connection.declare_queue(queue)).await?;
            info!(queue = queue.name(), "queue created");

            until_ready(plan.full_name(), &mut events, connection.bind_queue(binding)).await?;
            info!(
                queue = queue.name(),
                exchange = plan.full_name(),
                key = binding.key(),
                "queue bound"
            );
        }

        Ok(SetupOutcome {
            record: ExchangeRecord::new(plan.name(), plan.full_name(), plan.kind(), connection),
            events,
        })
    }

    fn transition(&mut self, next: SetupState) {
        debug!(
            exchange = self.plan.full_name(),
            from = ?self.state,
            to = ?next,
            "exchange setup transition"
        );
        self.state = next;
    }
}

/// Awaits one handshake step while watching the connection events.
///
/// Pending events are handled before the step so an error the connection
/// already reported wins over a step that completed in the meantime.
async fn until_ready<F>(
    exchange: &str,
    events: &mut UnboundedReceiver<ConnectionEvent>,
    step: F,
) -> Result<(), AmqpError>
where
    F: Future<Output = Result<(), AmqpError>>,
{
    tokio::pin!(step);

    loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => match event {
                ConnectionEvent::Heartbeat => debug!(exchange, "connection heartbeat"),
                ConnectionEvent::Closed => info!(exchange, "connection closing"),
                ConnectionEvent::Error { cause, peer_reset } => {
                    if peer_reset {
                        warn!(error = cause.as_str(), exchange, "connection reset by peer during setup");
                    } else {
                        error!(error = cause.as_str(), exchange, "connection error");
                    }
                    return Err(AmqpError::ConnectionError(cause));
                }
            },
            result = &mut step => return result,
        }
    }
}

/// Logs the events of a ready connection and flags its record as stale once
/// the connection errored or closed.
///
/// Stops when the connection drops its event sender or the record is gone.
pub(crate) async fn monitor(
    record: Weak<ExchangeRecord>,
    mut events: UnboundedReceiver<ConnectionEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(current) = record.upgrade() else {
            return;
        };

        match event {
            ConnectionEvent::Heartbeat => {
                debug!(exchange = current.full_name(), "connection heartbeat")
            }
            ConnectionEvent::Closed => {
                info!(exchange = current.full_name(), "connection closing");
                current.mark_stale();
            }
            ConnectionEvent::Error { cause, peer_reset } => {
                if !peer_reset {
                    error!(
                        error = cause.as_str(),
                        exchange = current.full_name(),
                        "connection error"
                    );
                }
                current.mark_stale();
            }
        }
    }

    debug!("connection event stream ended");
}
