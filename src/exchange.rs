// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! This module provides types for defining the exchanges a producer publishes to.
//! Two topologies are supported: fanout ("pubsub"), which broadcasts to every bound
//! queue, and direct ("workqueue"), which routes by exact routing key match.

use crate::{configs::ExchangeOptions, errors::AmqpError};
use lapin::types::{AMQPValue, ShortString};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Suffix appended to the broker-visible name of fanout exchanges
pub const PUBSUB_SUFFIX: &str = ".pubsub";
/// Suffix appended to the broker-visible name of direct exchanges
pub const WORKQUEUE_SUFFIX: &str = ".workqueue";

/// Represents the exchange topologies a producer can publish to.
///
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Direct: Routes messages to the queue whose binding key matches exactly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    #[default]
    Fanout,
    Direct,
}

impl ExchangeKind {
    /// Suffix that identifies the topology in the broker-visible exchange name.
    pub fn suffix(&self) -> &'static str {
        match self {
            ExchangeKind::Fanout => PUBSUB_SUFFIX,
            ExchangeKind::Direct => WORKQUEUE_SUFFIX,
        }
    }

    /// Routing key used when publishing on behalf of `exchange_name`.
    ///
    /// Fanout exchanges ignore the key, so it is left empty. Direct exchanges use
    /// the logical name, which is also the binding key of their auxiliary queue.
    pub fn routing_key<'a>(&self, exchange_name: &'a str) -> &'a str {
        match self {
            ExchangeKind::Fanout => "",
            ExchangeKind::Direct => exchange_name,
        }
    }

    /// Whether the topology owns an auxiliary queue bound to the exchange.
    pub fn has_queue(&self) -> bool {
        matches!(self, ExchangeKind::Direct)
    }
}

impl FromStr for ExchangeKind {
    type Err = AmqpError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind {
            "fanout" => Ok(ExchangeKind::Fanout),
            "direct" => Ok(ExchangeKind::Direct),
            other => Err(AmqpError::UnknownExchangeType(other.to_owned())),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Fanout => write!(f, "fanout"),
            ExchangeKind::Direct => write!(f, "direct"),
        }
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        }
    }
}

/// Definition of a RabbitMQ exchange with its configuration parameters.
///
/// This struct implements the builder pattern to create and configure exchange definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
    pub(crate) passive: bool,
    pub(crate) internal: bool,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl ExchangeDefinition {
    /// Creates a new exchange definition with the given name.
    ///
    /// By default, the exchange is created as a Fanout exchange with default parameters.
    ///
    /// # Parameters
    /// * `name` - The broker-visible name of the exchange
    ///
    /// # Returns
    /// A new exchange definition with default settings
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Fanout,
            delete: false,
            durable: false,
            passive: false,
            internal: false,
            params: BTreeMap::default(),
        }
    }

    /// Creates a definition for `name` from the configured exchange options.
    pub fn from_options(name: &str, kind: ExchangeKind, opts: &ExchangeOptions) -> ExchangeDefinition {
        let mut def = ExchangeDefinition::new(name)
            .kind(kind)
            .params(crate::configs::amqp_table(&opts.arguments));
        def.durable = opts.durable;
        def.delete = opts.auto_delete;
        def.internal = opts.internal;
        def.passive = opts.passive;
        def
    }

    /// Sets the exchange type.
    ///
    /// # Parameters
    /// * `kind` - The exchange type
    ///
    /// # Returns
    /// Self for method chaining
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange parameters.
    ///
    /// # Parameters
    /// * `params` - A map of exchange parameters
    ///
    /// # Returns
    /// Self for method chaining
    pub fn params(mut self, params: BTreeMap<ShortString, AMQPValue>) -> Self {
        self.params = params;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchange_kind(&self) -> ExchangeKind {
        self.kind
    }
}
