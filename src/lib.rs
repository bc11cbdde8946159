// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod channel;
pub mod configs;
pub mod errors;
pub mod exchange;
pub mod manager;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod setup;
pub mod topology;
pub mod transport;
