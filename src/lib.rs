// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;
mod signals;

#[cfg(test)]
mod test_support;

pub mod app;
pub mod builtin;
pub mod channel;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod errors;
pub mod message;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod response;
pub mod topology;
pub mod wait_group;
