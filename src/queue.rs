// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! This module provides the declarative queue definitions read from configuration,
//! the bindings that attach a queue to exchanges and the [`QueueHandle`] the
//! topology produces for every declared queue.

use serde::Deserialize;

fn default_durable() -> bool {
    true
}

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// Flags are sent to the broker verbatim. The optional `x_*` arguments are only
/// sent when they are present in the definition.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QueueDefinition {
    #[serde(rename = "queue")]
    pub(crate) name: String,
    #[serde(default = "default_durable")]
    pub(crate) durable: bool,
    #[serde(default)]
    pub(crate) auto_delete: bool,
    #[serde(default)]
    pub(crate) exclusive: bool,
    #[serde(default, rename = "x_dead_letter_exchange")]
    pub(crate) dead_letter_exchange: Option<String>,
    #[serde(default, rename = "x_dead_letter_routing_key")]
    pub(crate) dead_letter_routing_key: Option<String>,
    #[serde(default, rename = "x_max_length")]
    pub(crate) max_length: Option<i32>,
    #[serde(default, rename = "x_expires")]
    pub(crate) expires: Option<i32>,
    #[serde(default, rename = "x_message_ttl")]
    pub(crate) message_ttl: Option<i32>,
    #[serde(default)]
    pub(crate) bindings: Vec<QueueBinding>,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// Queues are durable, not auto-deleted and not exclusive unless told
    /// otherwise, matching the configuration defaults.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: true,
            auto_delete: false,
            exclusive: false,
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
            max_length: None,
            expires: None,
            message_ttl: None,
            bindings: vec![],
        }
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets whether the queue survives broker restarts.
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Sets the queue to auto-delete when its last consumer goes away.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the queue exclusive to the declaring connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Routes rejected and expired messages to `exchange` with `routing_key`.
    pub fn dead_letter(mut self, exchange: &str, routing_key: Option<&str>) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self.dead_letter_routing_key = routing_key.map(str::to_owned);
        self
    }

    /// Sets the maximum number of messages the queue can hold.
    pub fn max_length(mut self, max: i32) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Deletes the queue after it has been unused for `ms` milliseconds.
    pub fn expires(mut self, ms: i32) -> Self {
        self.expires = Some(ms);
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue, in milliseconds.
    pub fn ttl(mut self, ttl: i32) -> Self {
        self.message_ttl = Some(ttl);
        self
    }

    /// Adds a binding to the queue.
    pub fn binding(mut self, binding: QueueBinding) -> Self {
        self.bindings.push(binding);
        self
    }
}

/// Binding of a queue to an exchange with a routing key.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a binding to `exchange` with `routing_key`.
    pub fn new(exchange: &str, routing_key: &str) -> QueueBinding {
        QueueBinding {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        }
    }
}

/// A declared and bound queue, ready to be consumed from.
///
/// Handles are cheap to clone; several dispatch loops may consume from the same
/// handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    name: String,
    message_count: u32,
    consumer_count: u32,
}

impl QueueHandle {
    /// Creates a handle for a declared queue.
    ///
    /// # Parameters
    /// * `name` - The queue name the broker confirmed
    /// * `message_count` - Messages ready at declaration time
    /// * `consumer_count` - Consumers attached at declaration time
    pub fn new(name: &str, message_count: u32, consumer_count: u32) -> QueueHandle {
        QueueHandle {
            name: name.to_owned(),
            message_count,
            consumer_count,
        }
    }

    /// The name the broker confirmed for the queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages ready in the queue when it was declared.
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    /// Consumers attached to the queue when it was declared.
    pub fn consumer_count(&self) -> u32 {
        self.consumer_count
    }
}
