// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module provides functionality for publishing messages to the exchanges
//! managed by an [`ExchangeManager`]. The first publish to a name sets the
//! exchange up; every publish waits for the broker's confirm. Any failure,
//! whether during setup or publish, is reported as a single
//! [`AmqpError::PublishError`].

use crate::{
    configs::{amqp_table, AmqpConfigs},
    errors::AmqpError,
    manager::ExchangeManager,
    otel,
    registry::ExchangeRecord,
};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties,
};
use opentelemetry::Context;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};
use uuid::Uuid;

/// Publishes payloads to logical exchanges.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        ctx: &Context,
        exchange_name: &str,
        payload: &[u8],
    ) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Publisher trait.
///
/// The exchange topology (fanout or direct) and the publish options come from
/// the configuration the publisher was built with.
pub struct RabbitMQPublisher {
    manager: Arc<ExchangeManager>,
    cfg: Arc<AmqpConfigs>,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `manager` - The exchange manager shared by every producer of the process
    /// * `cfg` - Exchange, queue and publish options for this producer
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(manager: Arc<ExchangeManager>, cfg: Arc<AmqpConfigs>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { manager, cfg })
    }

    async fn exchange(&self, name: &str) -> Result<Arc<ExchangeRecord>, AmqpError> {
        match self.manager.get_exchange(name)? {
            Some(record) => Ok(record),
            None => {
                debug!(exchange = name, "exchange not ready, setting it up");
                self.manager.create_exchange(self.cfg.clone(), name).await
            }
        }
    }

    fn properties(&self, ctx: &Context) -> BasicProperties {
        let publish = &self.cfg.producer.publish;

        let mut headers = amqp_table(&publish.headers);
        otel::inject_context(ctx, &mut headers);

        let props = BasicProperties::default()
            .with_content_type(ShortString::from(publish.content_type.as_str()))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(FieldTable::from(headers));

        match publish.delivery_mode {
            Some(mode) => props.with_delivery_mode(mode),
            None => props,
        }
    }

    async fn try_publish(
        &self,
        ctx: &Context,
        exchange_name: &str,
        payload: &[u8],
    ) -> Result<(), AmqpError> {
        let record = self.exchange(exchange_name).await?;
        let publish = &self.cfg.producer.publish;

        let confirm = record.handle().publish(
            record.full_name(),
            record.routing_key(),
            payload,
            BasicPublishOptions {
                mandatory: publish.mandatory,
                immediate: publish.immediate,
            },
            self.properties(ctx),
        );

        match publish.timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), confirm)
                .await
                .unwrap_or_else(|_| {
                    Err(AmqpError::Timeout(format!(
                        "no confirm from `{}` within {}ms",
                        record.full_name(),
                        ms
                    )))
                }),
            None => confirm.await,
        }
    }
}

#[async_trait]
impl Publisher for RabbitMQPublisher {
    /// Publishes a message to the exchange set up for `exchange_name`.
    ///
    /// Fanout exchanges are published to with an empty routing key, direct
    /// exchanges with `exchange_name` itself. A failed publish keeps the
    /// exchange cached; only the message is reported as lost.
    ///
    /// # Parameters
    /// * `ctx` - OpenTelemetry context for tracing
    /// * `exchange_name` - Logical exchange name
    /// * `payload` - Message body
    ///
    /// # Returns
    /// Ok(()) once the broker confirmed the message, or PublishError
    async fn publish(
        &self,
        ctx: &Context,
        exchange_name: &str,
        payload: &[u8],
    ) -> Result<(), AmqpError> {
        self.try_publish(ctx, exchange_name, payload)
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    exchange = exchange_name,
                    payload = %String::from_utf8_lossy(payload),
                    "publish error"
                );
                err.into_publish_error()
            })
    }
}
