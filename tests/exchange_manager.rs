// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, types::ShortString, BasicProperties};
use opentelemetry::Context;
use rabbitmq_producer::{
    configs::{AmqpConfigs, ConnectionOptions},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    manager::ExchangeManager,
    publisher::{Publisher, RabbitMQPublisher},
    queue::{QueueBinding, QueueDefinition, AMQP_HEADERS_DEAD_LETTER_EXCHANGE},
    transport::{ConnectionEvent, Transport, TransportConnection, TransportSession},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Clone, PartialEq)]
struct Published {
    exchange: String,
    routing_key: String,
    payload: Vec<u8>,
}

/// In-memory broker recording what the manager asks of it.
#[derive(Default)]
struct FakeBroker {
    connects: AtomicUsize,
    exchanges: Mutex<Vec<String>>,
    queues: Mutex<Vec<QueueDefinition>>,
    bindings: Mutex<Vec<QueueBinding>>,
    published: Mutex<Vec<Published>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failing: Mutex<HashSet<String>>,
    nack_next: AtomicBool,
    senders: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
}

impl FakeBroker {
    fn new() -> Arc<FakeBroker> {
        Arc::new(FakeBroker::default())
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn exchanges(&self) -> Vec<String> {
        self.exchanges.lock().unwrap().clone()
    }

    fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    /// Holds declarations of `exchange` until [`FakeBroker::release`].
    fn hold(&self, exchange: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(exchange.to_owned(), Arc::new(Semaphore::new(0)));
    }

    fn release(&self, exchange: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(exchange) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    fn reject(&self, exchange: &str) {
        self.failing.lock().unwrap().insert(exchange.to_owned());
    }

    fn accept(&self, exchange: &str) {
        self.failing.lock().unwrap().remove(exchange);
    }

    fn emit(&self, event: ConnectionEvent) {
        for sender in self.senders.lock().unwrap().iter() {
            let _ = sender.send(event.clone());
        }
    }
}

struct FakeTransport(Arc<FakeBroker>);

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _options: &ConnectionOptions) -> Result<TransportSession, AmqpError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, events) = mpsc::unbounded_channel();
        self.0.senders.lock().unwrap().push(tx);

        Ok(TransportSession {
            connection: Arc::new(FakeConnection(self.0.clone())),
            events,
        })
    }
}

struct FakeConnection(Arc<FakeBroker>);

#[async_trait]
impl TransportConnection for FakeConnection {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.0.exchanges.lock().unwrap().push(def.name().to_owned());

        let gate = self.0.gates.lock().unwrap().get(def.name()).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.map_err(|_| AmqpError::InternalError)?;
        }

        if self.0.failing.lock().unwrap().contains(def.name()) {
            return Err(AmqpError::ExchangeError(def.name().to_owned()));
        }

        Ok(())
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        self.0.queues.lock().unwrap().push(def.clone());
        Ok(())
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.0.bindings.lock().unwrap().push(binding.clone());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        _options: BasicPublishOptions,
        _properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        if self.0.nack_next.swap(false, Ordering::SeqCst) {
            return Err(AmqpError::PublishError(
                "message was nacked by the broker".to_owned(),
            ));
        }

        self.0.published.lock().unwrap().push(Published {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn configs(kind: &str) -> Arc<AmqpConfigs> {
    let mut cfg = AmqpConfigs::default();
    cfg.impl_options.reconnect = true;
    cfg.producer.exchange.options.kind = kind.to_owned();
    Arc::new(cfg)
}

fn fixture(kind: &str) -> (Arc<FakeBroker>, Arc<ExchangeManager>, Arc<RabbitMQPublisher>) {
    let broker = FakeBroker::new();
    let manager = ExchangeManager::new(Arc::new(FakeTransport(broker.clone())));
    let publisher = RabbitMQPublisher::new(manager.clone(), configs(kind));
    (broker, manager, publisher)
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn concurrent_publishes_share_one_handshake() {
    let (broker, manager, publisher) = fixture("fanout");
    broker.hold("orders.pubsub");

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                publisher
                    .publish(&Context::current(), "orders", format!("{}", i).as_bytes())
                    .await
            })
        })
        .collect();

    while broker.connects() == 0 {
        tokio::task::yield_now().await;
    }
    settle().await;
    assert_eq!(broker.connects(), 1);
    assert!(manager.get_exchange("orders").unwrap().is_none());

    broker.release("orders.pubsub");
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(broker.connects(), 1);
    assert_eq!(broker.exchanges(), vec!["orders.pubsub".to_owned()]);
    assert_eq!(broker.published().len(), 5);
}

#[tokio::test]
async fn different_names_do_not_block_each_other() {
    let (broker, _manager, publisher) = fixture("fanout");
    broker.hold("slow.pubsub");

    let slow = {
        let publisher = publisher.clone();
        tokio::spawn(async move { publisher.publish(&Context::current(), "slow", b"s").await })
    };
    settle().await;

    let fast = publisher.publish(&Context::current(), "fast", b"f").await;

    assert!(fast.is_ok());
    assert!(!slow.is_finished());

    broker.release("slow.pubsub");
    assert!(slow.await.unwrap().is_ok());
    assert_eq!(broker.connects(), 2);
}

#[tokio::test]
async fn fanout_topology() {
    let (broker, manager, publisher) = fixture("fanout");

    publisher
        .publish(&Context::current(), "orders/created", b"{}")
        .await
        .unwrap();

    assert_eq!(broker.exchanges(), vec!["orders.created.pubsub".to_owned()]);
    assert!(broker.queues.lock().unwrap().is_empty());
    assert_eq!(
        broker.published(),
        vec![Published {
            exchange: "orders.created.pubsub".to_owned(),
            routing_key: "".to_owned(),
            payload: b"{}".to_vec(),
        }]
    );
    assert_eq!(
        manager.get_exchange("orders/created").unwrap().unwrap().full_name(),
        "orders.created.pubsub"
    );
}

#[tokio::test]
async fn direct_topology() {
    let (broker, _manager, publisher) = fixture("direct");

    publisher
        .publish(&Context::current(), "orders/created", b"{}")
        .await
        .unwrap();

    assert_eq!(broker.exchanges(), vec!["orders.created.workqueue".to_owned()]);

    let queues = broker.queues.lock().unwrap().clone();
    assert_eq!(queues.len(), 1);
    assert_eq!(queues[0].name(), "orders/created");
    assert_eq!(
        queues[0].dead_letter_exchange(),
        Some("orders.created.workqueue.dead")
    );
    assert!(queues[0]
        .arguments()
        .contains_key(&ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE)));

    let bindings = broker.bindings.lock().unwrap().clone();
    assert_eq!(
        bindings,
        vec![QueueBinding::new("orders/created")
            .exchange("orders.created.workqueue")
            .routing_key("orders/created")]
    );

    assert_eq!(broker.published()[0].routing_key, "orders/created");
}

#[tokio::test]
async fn nack_is_reported_and_the_exchange_stays_cached() {
    let (broker, manager, publisher) = fixture("fanout");
    publisher.publish(&Context::current(), "orders", b"1").await.unwrap();
    broker.nack_next.store(true, Ordering::SeqCst);

    let nacked = publisher.publish(&Context::current(), "orders", b"2").await;
    let next = publisher.publish(&Context::current(), "orders", b"3").await;

    assert_eq!(
        nacked,
        Err(AmqpError::PublishError(
            "message was nacked by the broker".to_owned()
        ))
    );
    assert!(next.is_ok());
    assert_eq!(broker.connects(), 1);
    assert!(manager.get_exchange("orders").unwrap().is_some());
}

#[tokio::test]
async fn failed_declaration_is_not_cached() {
    let (broker, manager, publisher) = fixture("fanout");
    broker.reject("orders.pubsub");

    let failed = publisher.publish(&Context::current(), "orders", b"1").await;

    assert_eq!(
        failed,
        Err(AmqpError::PublishError(
            "failure to declare an exchange `orders.pubsub`".to_owned()
        ))
    );
    assert!(manager.get_exchange("orders").unwrap().is_none());

    broker.accept("orders.pubsub");
    let retried = publisher.publish(&Context::current(), "orders", b"2").await;

    assert!(retried.is_ok());
    assert_eq!(broker.connects(), 2);
}

#[tokio::test]
async fn connection_error_during_setup_rejects_every_waiter() {
    let (broker, manager, publisher) = fixture("fanout");
    broker.hold("orders.pubsub");

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let publisher = publisher.clone();
            tokio::spawn(async move { publisher.publish(&Context::current(), "orders", b"x").await })
        })
        .collect();
    while broker.connects() == 0 {
        tokio::task::yield_now().await;
    }
    settle().await;

    broker.emit(ConnectionEvent::Error {
        cause: "boom".to_owned(),
        peer_reset: false,
    });

    for handle in handles {
        assert_eq!(
            handle.await.unwrap(),
            Err(AmqpError::PublishError("failure to connect: boom".to_owned()))
        );
    }
    assert_eq!(broker.connects(), 1);
    assert!(manager.is_empty().unwrap());
}

#[tokio::test]
async fn setup_timeout() {
    let broker = FakeBroker::new();
    broker.hold("orders.pubsub");
    let manager = ExchangeManager::new(Arc::new(FakeTransport(broker.clone())));
    let mut cfg = AmqpConfigs::default();
    cfg.impl_options.reconnect = true;
    cfg.impl_options.setup_timeout_ms = Some(20);

    let actual = manager.create_exchange(Arc::new(cfg), "orders").await;

    assert!(matches!(actual, Err(AmqpError::Timeout(_))));
    assert!(manager.is_empty().unwrap());
}

#[tokio::test]
async fn lost_connection_is_declared_again() {
    let (broker, manager, publisher) = fixture("fanout");
    publisher.publish(&Context::current(), "orders", b"1").await.unwrap();

    broker.emit(ConnectionEvent::Closed);
    for _ in 0..100 {
        if manager.get_exchange("orders").unwrap().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    publisher.publish(&Context::current(), "orders", b"2").await.unwrap();

    assert_eq!(broker.connects(), 2);
    assert_eq!(broker.published().len(), 2);
}

#[tokio::test]
async fn heartbeats_do_not_invalidate_the_exchange() {
    let (broker, manager, publisher) = fixture("fanout");
    publisher.publish(&Context::current(), "orders", b"1").await.unwrap();

    broker.emit(ConnectionEvent::Heartbeat);
    settle().await;

    assert!(manager.get_exchange("orders").unwrap().is_some());
    publisher.publish(&Context::current(), "orders", b"2").await.unwrap();
    assert_eq!(broker.connects(), 1);
}

#[tokio::test]
async fn lookups() {
    let (_broker, manager, _publisher) = fixture("fanout");

    assert!(manager.get_exchange("never-created").unwrap().is_none());
    assert!(matches!(
        manager.get_exchange(""),
        Err(AmqpError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn reconnect_disabled_never_connects() {
    let broker = FakeBroker::new();
    let manager = ExchangeManager::new(Arc::new(FakeTransport(broker.clone())));

    let actual = manager
        .create_exchange(Arc::new(AmqpConfigs::default()), "orders")
        .await;

    assert_eq!(actual.err(), Some(AmqpError::ConfigurationError));
    assert_eq!(broker.connects(), 0);
}
