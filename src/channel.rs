// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the creation of AMQP connections and channels on top of
//! lapin. Every connection gets one channel in publisher confirm mode, so each
//! publish resolves only after the broker acked or nacked the message.

use crate::{
    configs::ConnectionOptions,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    transport::{ConnectionEvent, Transport, TransportConnection, TransportSession},
};
use async_trait::async_trait;
use lapin::{
    options::{
        BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::{FieldTable, LongString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::{io, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// [`Transport`] backed by lapin.
#[derive(Debug, Clone, Default)]
pub struct LapinTransport;

impl LapinTransport {
    pub fn new() -> Arc<LapinTransport> {
        Arc::new(LapinTransport)
    }
}

#[async_trait]
impl Transport for LapinTransport {
    /// Connects to RabbitMQ and opens a confirm-mode channel.
    ///
    /// Connection failures reported by lapin after this point are forwarded to
    /// the session's event receiver.
    async fn connect(&self, options: &ConnectionOptions) -> Result<TransportSession, AmqpError> {
        debug!("creating amqp connection...");
        let props = ConnectionProperties::default()
            .with_connection_name(LongString::from(options.connection_name.clone()));

        let conn = match Connection::connect(&options.uri(), props).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
        }?;
        debug!("amqp connected");

        // lapin 2 only exposes `on_error`, so this transport never emits
        // `Heartbeat` or `Closed`.
        let (tx, events) = mpsc::unbounded_channel();
        conn.on_error(move |err| {
            let _ = tx.send(ConnectionEvent::Error {
                cause: err.to_string(),
                peer_reset: is_peer_reset(&err),
            });
        });

        debug!("creating amqp channel...");
        let channel = match conn.create_channel().await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }?;

        if let Err(err) = channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await
        {
            error!(error = err.to_string(), "error to enable publisher confirms");
            return Err(AmqpError::ChannelError(err.to_string()));
        }
        debug!("channel created");

        Ok(TransportSession {
            connection: Arc::new(LapinConnection { conn, channel }),
            events,
        })
    }
}

fn is_peer_reset(err: &lapin::Error) -> bool {
    matches!(err, lapin::Error::IOError(io_err) if io_err.kind() == io::ErrorKind::ConnectionReset)
}

/// A lapin connection and its confirm-mode channel.
pub struct LapinConnection {
    conn: Connection,
    channel: Channel,
}

#[async_trait]
impl TransportConnection for LapinConnection {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        match self
            .channel
            .exchange_declare(
                &def.name,
                def.kind.into(),
                ExchangeDeclareOptions {
                    passive: def.passive,
                    durable: def.durable,
                    auto_delete: def.delete,
                    internal: def.internal,
                    nowait: false,
                },
                FieldTable::from(def.params.clone()),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the exchange"
                );
                Err(AmqpError::ExchangeError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        debug!("creating queue: {}", def.name);

        match self
            .channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: def.passive,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.delete,
                    nowait: false,
                },
                FieldTable::from(def.arguments()),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name = def.name.as_str(), "error to declare the queue");
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue_name, binding.exchange_name, binding.routing_key
        );

        match self
            .channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: BasicPublishOptions,
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        let confirm = self
            .channel
            .basic_publish(exchange, routing_key, options, payload, properties)
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error publishing message");
                AmqpError::PublishError(err.to_string())
            })?;

        match confirm.await {
            Ok(Confirmation::Nack(_)) => Err(AmqpError::PublishError(
                "message was nacked by the broker".to_owned(),
            )),
            Ok(Confirmation::Ack(Some(_))) => Err(AmqpError::PublishError(
                "message was returned by the broker as unroutable".to_owned(),
            )),
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "error waiting for the publish confirm");
                Err(AmqpError::PublishError(err.to_string()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.status().connected()
    }
}
