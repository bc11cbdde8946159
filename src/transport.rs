// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Boundary
//!
//! Traits the exchange manager uses to talk to the broker. The lapin backed
//! implementation lives in [`crate::channel`]; tests plug in their own.
//!
//! A successful [`Transport::connect`] means the connection is ready. Everything
//! the connection reports afterwards arrives as a [`ConnectionEvent`] on the
//! session's receiver.

use crate::{
    configs::ConnectionOptions,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties};
use std::{fmt, sync::Arc};
use tokio::sync::mpsc::UnboundedReceiver;

#[cfg(test)]
use mockall::automock;

/// Asynchronous notifications emitted by an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Heartbeat,
    Closed,
    Error {
        cause: String,
        /// The peer reset the TCP connection
        peer_reset: bool,
    },
}

/// An open connection with a channel ready for declarations and publishing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// Declares an exchange, resolving once the broker acknowledged it.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares a queue, resolving once the broker acknowledged it.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange, resolving once the broker acknowledged it.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Publishes one message and waits for the broker's confirm.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: BasicPublishOptions,
        properties: BasicProperties,
    ) -> Result<(), AmqpError>;

    fn is_connected(&self) -> bool;
}

/// A connection handle together with its event stream.
pub struct TransportSession {
    pub connection: Arc<dyn TransportConnection>,
    pub events: UnboundedReceiver<ConnectionEvent>,
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("connected", &self.connection.is_connected())
            .finish()
    }
}

/// Opens connections to the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, options: &ConnectionOptions) -> Result<TransportSession, AmqpError>;
}
