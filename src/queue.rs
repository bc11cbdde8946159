// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! This module provides types for the auxiliary queue a direct exchange owns.
//! The queue forwards the messages it cannot deliver to a dead-letter exchange.

use crate::configs::{amqp_table, QueueOptions};
use lapin::types::{AMQPValue, LongString, ShortString};
use std::collections::BTreeMap;

/// Constant for the argument used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// This struct implements the builder pattern to create and configure queue definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) passive: bool,
    pub(crate) dead_letter_exchange: Option<String>,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is created with standard settings (non-durable, non-exclusive, etc.)
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    ///
    /// # Returns
    /// A new queue definition with default settings
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..QueueDefinition::default()
        }
    }

    /// Creates a definition for `name` from the configured queue options.
    pub fn from_options(name: &str, opts: &QueueOptions) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: opts.durable,
            delete: opts.auto_delete,
            exclusive: opts.exclusive,
            passive: opts.passive,
            dead_letter_exchange: None,
            params: amqp_table(&opts.arguments),
        }
    }

    /// Routes rejected and expired messages to `exchange`.
    ///
    /// The dead letter exchange always wins over an
    /// `x-dead-letter-exchange` entry in the configured queue arguments.
    ///
    /// # Parameters
    /// * `exchange` - Name of the dead letter exchange
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dead_letter_exchange(&self) -> Option<&str> {
        self.dead_letter_exchange.as_deref()
    }

    /// Arguments sent with the queue declaration.
    pub fn arguments(&self) -> BTreeMap<ShortString, AMQPValue> {
        let mut args = self.params.clone();

        if let Some(dlx) = &self.dead_letter_exchange {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(dlx.as_str())),
            );
        }

        args
    }
}

/// Configuration for binding a queue to an exchange.
///
/// Queue bindings define how messages flow from exchanges to queues based on
/// routing keys and exchange types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new queue binding for the given queue.
    ///
    /// By default, the exchange name and routing key are empty strings.
    /// These should be set using the `exchange` and `routing_key` methods.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            ..QueueBinding::default()
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dead_letter_exchange_overrides_configured_argument() {
        let opts = QueueOptions {
            arguments: json!({ "x-dead-letter-exchange": "elsewhere", "x-max-length": 10 })
                .as_object()
                .cloned()
                .unwrap(),
            ..QueueOptions::default()
        };

        let def = QueueDefinition::from_options("jobs", &opts)
            .with_dead_letter_exchange("jobs.workqueue.dead");
        let args = def.arguments();

        assert_eq!(
            args[&ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE)],
            AMQPValue::LongString(LongString::from("jobs.workqueue.dead"))
        );
        assert_eq!(args[&ShortString::from("x-max-length")], AMQPValue::LongLongInt(10));
        assert!(def.durable);
    }

    #[test]
    fn no_dead_letter_argument_by_default() {
        let def = QueueDefinition::new("jobs");

        assert!(def.arguments().is_empty());
        assert_eq!(def.dead_letter_exchange(), None);
    }

    #[test]
    fn binding_builder() {
        let binding = QueueBinding::new("jobs")
            .exchange("jobs.workqueue")
            .routing_key("jobs");

        assert_eq!(binding.queue_name(), "jobs");
        assert_eq!(binding.exchange_name(), "jobs.workqueue");
        assert_eq!(binding.key(), "jobs");
    }
}
