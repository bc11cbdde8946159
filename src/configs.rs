// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Producer Configuration
//!
//! This module defines the configuration consumed by the exchange manager and the
//! publisher. The layout follows the JSON document applications already ship:
//!
//! ```json
//! {
//!   "options": { "host": "localhost", "port": 5672, "login": "guest", "password": "guest", "vhost": "/" },
//!   "implOptions": { "reconnect": true },
//!   "producer": {
//!     "exchange": { "options": { "type": "direct", "durable": true } },
//!     "queue": { "options": { "durable": true } },
//!     "publish": { "deliveryMode": 2 }
//!   }
//! }
//! ```

use crate::errors::AmqpError;
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::error;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Root configuration for a producer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmqpConfigs {
    /// Transport connection parameters
    pub options: ConnectionOptions,
    /// Behaviour expected from the transport implementation
    pub impl_options: ImplOptions,
    /// Exchange, queue and publish options
    pub producer: ProducerConfigs,
}

impl AmqpConfigs {
    /// Parses the configuration from a JSON document.
    pub fn from_json(raw: &str) -> Result<AmqpConfigs, AmqpError> {
        serde_json::from_str(raw).map_err(|err| {
            error!(error = err.to_string(), "failure to parse configuration");
            AmqpError::LoadConfigError(err.to_string())
        })
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<AmqpConfigs, AmqpError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            error!(
                error = err.to_string(),
                path = %path.display(),
                "failure to read configuration file"
            );
            AmqpError::LoadConfigError(err.to_string())
        })?;

        AmqpConfigs::from_json(&raw)
    }
}

/// Connection parameters for the RabbitMQ server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub vhost: String,
    pub connection_name: String,
    /// Heartbeat interval in seconds negotiated with the broker
    pub heartbeat: Option<u16>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            host: "localhost".to_owned(),
            port: 5672,
            login: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            connection_name: "rabbitmq-producer".to_owned(),
            heartbeat: None,
        }
    }
}

impl ConnectionOptions {
    /// Builds the AMQP URI for these options.
    ///
    /// The vhost is percent-encoded so the default `/` vhost becomes `%2f`.
    pub fn uri(&self) -> String {
        let uri = format!(
            "amqp://{}:{}@{}:{}/{}",
            self.login,
            self.password,
            self.host,
            self.port,
            self.vhost.replace('/', "%2f")
        );

        match self.heartbeat {
            Some(heartbeat) => format!("{}?heartbeat={}", uri, heartbeat),
            None => uri,
        }
    }
}

/// Options describing what the transport is expected to do on its own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImplOptions {
    /// Must be `true`: the setup coordinator never reconnects by itself.
    pub reconnect: bool,
    /// Upper bound for one setup handshake. No bound when absent.
    pub setup_timeout_ms: Option<u64>,
}

/// Producer side options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProducerConfigs {
    pub exchange: ExchangeConfigs,
    pub queue: QueueConfigs,
    pub publish: PublishConfigs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExchangeConfigs {
    pub options: ExchangeOptions,
}

/// Options used to declare the exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExchangeOptions {
    /// `fanout` or `direct`; anything else fails the setup
    #[serde(rename = "type")]
    pub kind: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub passive: bool,
    pub arguments: Map<String, Value>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        ExchangeOptions {
            kind: "fanout".to_owned(),
            durable: true,
            auto_delete: false,
            internal: false,
            passive: false,
            arguments: Map::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueConfigs {
    pub options: QueueOptions,
}

/// Options used to declare the auxiliary queue of a direct exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub passive: bool,
    pub arguments: Map<String, Value>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            durable: true,
            auto_delete: false,
            exclusive: false,
            passive: false,
            arguments: Map::default(),
        }
    }
}

/// Options applied to every publish call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishConfigs {
    pub mandatory: bool,
    pub immediate: bool,
    /// 1 = transient, 2 = persistent
    pub delivery_mode: Option<u8>,
    pub content_type: String,
    pub headers: Map<String, Value>,
    /// Upper bound for the broker confirm. No bound when absent.
    pub timeout_ms: Option<u64>,
}

impl Default for PublishConfigs {
    fn default() -> Self {
        PublishConfigs {
            mandatory: false,
            immediate: false,
            delivery_mode: None,
            content_type: JSON_CONTENT_TYPE.to_owned(),
            headers: Map::default(),
            timeout_ms: None,
        }
    }
}

/// Converts a JSON value into the matching AMQP field value.
pub(crate) fn amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(v) => AMQPValue::Boolean(*v),
        Value::Number(n) => match n.as_i64() {
            Some(v) => AMQPValue::LongLongInt(v),
            None => AMQPValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(v) => AMQPValue::LongString(LongString::from(v.as_str())),
        Value::Array(items) => {
            AMQPValue::FieldArray(FieldArray::from(items.iter().map(amqp_value).collect::<Vec<_>>()))
        }
        Value::Object(map) => AMQPValue::FieldTable(FieldTable::from(amqp_table(map))),
    }
}

/// Converts a JSON object into an AMQP argument table.
pub(crate) fn amqp_table(map: &Map<String, Value>) -> BTreeMap<ShortString, AMQPValue> {
    map.iter()
        .map(|(key, value)| (ShortString::from(key.as_str()), amqp_value(value)))
        .collect()
}
