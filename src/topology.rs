// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Producer Topology
//!
//! This module derives, for one logical exchange name, everything that has to
//! exist on the broker before a producer can publish:
//! - the exchange, named after the logical name with `/` replaced by `.` and a
//!   topology suffix (`.pubsub` or `.workqueue`)
//! - for direct exchanges, a queue named after the logical name, bound with the
//!   logical name as key and dead-lettering to `<full name>.dead`
//!
//! Nothing here talks to the broker; the setup coordinator executes the plan.

use crate::{
    configs::ProducerConfigs,
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    queue::{QueueBinding, QueueDefinition},
};

/// Suffix appended to the full exchange name to form the dead letter exchange
pub const DEAD_LETTER_SUFFIX: &str = ".dead";

/// Broker-visible name of the exchange for `name`.
pub fn full_exchange_name(name: &str, kind: ExchangeKind) -> String {
    format!("{}{}", name.replace('/', "."), kind.suffix())
}

/// Declarations needed to publish to one logical exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerTopology {
    name: String,
    full_name: String,
    kind: ExchangeKind,
    exchange: ExchangeDefinition,
    queue: Option<(QueueDefinition, QueueBinding)>,
}

impl ProducerTopology {
    /// Plans the declarations for `name` from the producer configuration.
    ///
    /// # Returns
    /// The plan, `InvalidArgument` for an empty name, or `UnknownExchangeType`
    /// when the configured type is neither fanout nor direct.
    pub fn new(name: &str, cfg: &ProducerConfigs) -> Result<ProducerTopology, AmqpError> {
        if name.is_empty() {
            return Err(AmqpError::InvalidArgument(
                "exchange name must be a non-empty string".to_owned(),
            ));
        }

        let kind: ExchangeKind = cfg.exchange.options.kind.parse()?;
        let full_name = full_exchange_name(name, kind);
        let exchange = ExchangeDefinition::from_options(&full_name, kind, &cfg.exchange.options);

        let queue = if kind.has_queue() {
            let dead_letter = format!("{}{}", full_name, DEAD_LETTER_SUFFIX);
            let def = QueueDefinition::from_options(name, &cfg.queue.options)
                .with_dead_letter_exchange(&dead_letter);
            let binding = QueueBinding::new(name).exchange(&full_name).routing_key(name);
            Some((def, binding))
        } else {
            None
        };

        Ok(ProducerTopology {
            name: name.to_owned(),
            full_name,
            kind,
            exchange,
            queue,
        })
    }

    /// Logical name supplied by the caller.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn exchange(&self) -> &ExchangeDefinition {
        &self.exchange
    }

    /// Auxiliary queue and its binding, present for direct exchanges only.
    pub fn queue(&self) -> Option<&(QueueDefinition, QueueBinding)> {
        self.queue.as_ref()
    }

    pub fn routing_key(&self) -> &str {
        self.kind.routing_key(&self.name)
    }
}
