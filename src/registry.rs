// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Registry
//!
//! Cache of exchanges that completed their setup handshake, keyed by the logical
//! exchange name the caller supplied. Entries are only added after a successful
//! declaration. The manager evicts an entry once its connection was lost.

use crate::{errors::AmqpError, exchange::ExchangeKind, transport::TransportConnection};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::error;

/// A declared exchange, ready for publishing.
///
/// The record owns the connection the exchange was declared on. It is immutable
/// apart from the stale flag, which the connection monitor raises once the
/// connection reported an error or closed.
pub struct ExchangeRecord {
    name: String,
    full_name: String,
    kind: ExchangeKind,
    handle: Arc<dyn TransportConnection>,
    stale: AtomicBool,
}

impl ExchangeRecord {
    pub fn new(
        name: &str,
        full_name: &str,
        kind: ExchangeKind,
        handle: Arc<dyn TransportConnection>,
    ) -> ExchangeRecord {
        ExchangeRecord {
            name: name.to_owned(),
            full_name: full_name.to_owned(),
            kind,
            handle,
            stale: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Broker-visible exchange name.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn routing_key(&self) -> &str {
        self.kind.routing_key(&self.name)
    }

    /// Connection the exchange was declared on.
    pub fn handle(&self) -> &Arc<dyn TransportConnection> {
        &self.handle
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

impl fmt::Debug for ExchangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeRecord")
            .field("name", &self.name)
            .field("full_name", &self.full_name)
            .field("kind", &self.kind)
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// Map from logical exchange name to its declared exchange.
#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    records: HashMap<String, Arc<ExchangeRecord>>,
}

impl ExchangeRegistry {
    pub fn new() -> ExchangeRegistry {
        ExchangeRegistry::default()
    }

    /// Looks up the record for `name`.
    ///
    /// # Returns
    /// `Ok(None)` when nothing was declared under that name, or
    /// `InvalidArgument` when `name` is empty.
    pub fn get(&self, name: &str) -> Result<Option<Arc<ExchangeRecord>>, AmqpError> {
        if name.is_empty() {
            error!("exchange lookup with an empty name");
            return Err(AmqpError::InvalidArgument(
                "exchange name must be a non-empty string".to_owned(),
            ));
        }

        Ok(self.records.get(name).cloned())
    }

    /// Inserts the record under its logical name, replacing any previous one.
    pub fn put(&mut self, record: Arc<ExchangeRecord>) {
        self.records.insert(record.name().to_owned(), record);
    }

    pub(crate) fn evict(&mut self, name: &str) -> Option<Arc<ExchangeRecord>> {
        self.records.remove(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
