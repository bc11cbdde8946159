// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Producer
//!
//! This module provides the error taxonomy shared by the exchange registry, the
//! setup coordinator and the publisher. Errors are `Clone` because a single setup
//! outcome is handed to every caller waiting on the same exchange.

use thiserror::Error;

/// Represents errors that can occur while setting up exchanges and publishing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// The configuration does not enable automatic reconnection
    #[error("configuration error: implementation options - reconnect must be true")]
    ConfigurationError,

    /// The configuration could not be read or parsed
    #[error("failure to load configuration: {0}")]
    LoadConfigError(String),

    /// A caller supplied a malformed argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The configured exchange type is neither fanout nor direct
    #[error("unknown exchange type `{0}`")]
    UnknownExchangeType(String),

    /// Error establishing or keeping a connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// The broker rejected the exchange declaration
    #[error("failure to declare an exchange `{0}`")]
    ExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    BindingExchangeToQueueError(String, String),

    /// The broker rejected or failed to acknowledge a publish
    #[error("Error publishing: {0}")]
    PublishError(String),

    /// A setup handshake or a publish confirm took longer than configured
    #[error("timed out: {0}")]
    Timeout(String),
}

impl AmqpError {
    /// Wraps any error into a [`AmqpError::PublishError`] carrying the original
    /// cause message. A publish error is returned untouched.
    pub fn into_publish_error(self) -> AmqpError {
        match self {
            AmqpError::PublishError(_) => self,
            other => AmqpError::PublishError(other.to_string()),
        }
    }
}
