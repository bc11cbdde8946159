// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Manager
//!
//! Owns the exchange registry and the in-flight setup handshakes. A single
//! instance is meant to be built by the application and shared with every
//! producer, so that one logical exchange name maps to one broker connection
//! for the lifetime of the process.
//!
//! Concurrent requests for a name that is still being set up are collapsed
//! into the handshake already running; handshakes for different names run
//! independently, each over its own connection.

use crate::{
    configs::AmqpConfigs,
    errors::AmqpError,
    registry::{ExchangeRecord, ExchangeRegistry},
    setup::{self, ExchangeSetup},
    transport::Transport,
};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, error, warn};

type SetupFuture = Shared<BoxFuture<'static, Result<Arc<ExchangeRecord>, AmqpError>>>;

#[derive(Default)]
struct Inner {
    registry: ExchangeRegistry,
    pending: HashMap<String, SetupFuture>,
}

/// Process-wide cache of declared exchanges.
pub struct ExchangeManager {
    transport: Arc<dyn Transport>,
    inner: Arc<Mutex<Inner>>,
    evict_stale: bool,
}

impl ExchangeManager {
    /// Creates a new exchange manager.
    ///
    /// # Parameters
    /// * `transport` - Opens the broker connections, one per logical exchange
    ///
    /// # Returns
    /// An Arc-wrapped ExchangeManager instance for thread-safe sharing
    pub fn new(transport: Arc<dyn Transport>) -> Arc<ExchangeManager> {
        Arc::new(ExchangeManager::with_transport(transport))
    }

    fn with_transport(transport: Arc<dyn Transport>) -> ExchangeManager {
        ExchangeManager {
            transport,
            inner: Arc::new(Mutex::new(Inner::default())),
            evict_stale: true,
        }
    }

    /// Creates a manager, choosing whether records of dropped connections are evicted.
    ///
    /// By default a record whose connection errored or closed is evicted on the
    /// next lookup, so the following publish declares the exchange again. With
    /// `evict` set to false such a record stays cached for good.
    pub fn with_stale_eviction(transport: Arc<dyn Transport>, evict: bool) -> Arc<ExchangeManager> {
        let mut manager = ExchangeManager::with_transport(transport);
        manager.evict_stale = evict;
        Arc::new(manager)
    }

    /// Returns the declared exchange for `name`, if any.
    ///
    /// # Returns
    /// `Ok(None)` when the exchange was never set up, or `InvalidArgument`
    /// when `name` is empty.
    pub fn get_exchange(&self, name: &str) -> Result<Option<Arc<ExchangeRecord>>, AmqpError> {
        let mut inner = self.lock()?;
        self.lookup(&mut inner, name)
    }

    /// Returns the declared exchange for `name`, running the setup handshake
    /// first when needed.
    ///
    /// At most one handshake runs per name: callers arriving while it is in
    /// flight wait for the same outcome. A failed handshake leaves nothing
    /// behind, so a later call starts over.
    ///
    /// # Returns
    /// The ready exchange, or `ConfigurationError` when reconnection is not
    /// enabled, `UnknownExchangeType`, or the first error of the handshake.
    pub async fn create_exchange(
        &self,
        cfg: Arc<AmqpConfigs>,
        name: &str,
    ) -> Result<Arc<ExchangeRecord>, AmqpError> {
        let setup = ExchangeSetup::new(cfg, name)?;

        let pending = {
            let mut inner = self.lock()?;

            if let Some(record) = self.lookup(&mut inner, name)? {
                return Ok(record);
            }

            match inner.pending.get(name) {
                Some(pending) => {
                    debug!(exchange = name, "waiting for in-flight exchange setup");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_setup(setup);
                    inner.pending.insert(name.to_owned(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Number of exchanges currently cached.
    pub fn len(&self) -> Result<usize, AmqpError> {
        Ok(self.lock()?.registry.len())
    }

    pub fn is_empty(&self) -> Result<bool, AmqpError> {
        Ok(self.lock()?.registry.is_empty())
    }

    fn lookup(
        &self,
        inner: &mut Inner,
        name: &str,
    ) -> Result<Option<Arc<ExchangeRecord>>, AmqpError> {
        match inner.registry.get(name)? {
            Some(record) if self.evict_stale && record.is_stale() => {
                warn!(
                    exchange = record.full_name(),
                    "connection of the exchange was lost, evicting it"
                );
                inner.registry.evict(name);
                Ok(None)
            }
            found => Ok(found),
        }
    }

    /// Runs the handshake on its own task so it completes even when every
    /// waiting caller went away.
    fn spawn_setup(&self, mut handshake: ExchangeSetup) -> SetupFuture {
        let transport = self.transport.clone();
        let inner = self.inner.clone();
        let name = handshake.name().to_owned();

        let handle = tokio::spawn(async move {
            let result = handshake.run(transport).await;

            let mut guard = match inner.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    error!(exchange = name.as_str(), "exchange registry lock poisoned");
                    return Err(AmqpError::InternalError);
                }
            };
            guard.pending.remove(&name);

            let outcome = result?;
            let record = Arc::new(outcome.record);
            guard.registry.put(record.clone());
            tokio::spawn(setup::monitor(Arc::downgrade(&record), outcome.events));

            Ok::<_, AmqpError>(record)
        });

        async move {
            handle.await.unwrap_or_else(|err| {
                error!(error = err.to_string(), "exchange setup task failed");
                Err(AmqpError::InternalError)
            })
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AmqpError> {
        self.inner.lock().map_err(|_| {
            error!("exchange registry lock poisoned");
            AmqpError::InternalError
        })
    }
}
