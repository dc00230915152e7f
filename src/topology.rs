// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares the configured queues and binds them to their
//! exchanges, once, before any consumer starts. Installing the topology yields a
//! [`QueueHandle`] per queue name for the dispatch loops to consume from.
//!
//! Any declaration or binding failure is returned as is: it points at a
//! configuration or permission problem that retrying will not fix.

use crate::{
    channel::Broker,
    errors::AmqpError,
    queue::{QueueDefinition, QueueHandle},
};
use async_trait::async_trait;
use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongInt, LongString, ShortString},
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{debug, info};

/// Constant for the argument used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the argument used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Constant for the argument used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the argument used to specify how long an unused queue lives
pub const AMQP_HEADERS_EXPIRES: &str = "x-expires";
/// Constant for the argument used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";

/// Trait defining the interface for topology management.
#[async_trait]
pub trait Topology<'tp> {
    /// Adds a queue definition to the topology.
    fn queue(self, def: &'tp QueueDefinition) -> Self;

    /// Declares every queue and binding, returning the declared queues by name.
    async fn install(&self) -> Result<HashMap<String, QueueHandle>, AmqpError>;
}

/// Topology installed through a [`Broker`] channel.
pub struct AmqpTopology<'tp> {
    broker: Arc<dyn Broker>,
    pub(crate) queues: Vec<&'tp QueueDefinition>,
}

impl<'tp> AmqpTopology<'tp> {
    /// Creates an empty topology declared through `broker`.
    pub fn new(broker: Arc<dyn Broker>) -> AmqpTopology<'tp> {
        AmqpTopology {
            broker,
            queues: vec![],
        }
    }

    /// Creates a topology for every queue in `defs`.
    pub fn from_definitions(broker: Arc<dyn Broker>, defs: &'tp [QueueDefinition]) -> AmqpTopology<'tp> {
        defs.iter()
            .fold(AmqpTopology::new(broker), |topology, def| topology.queue(def))
    }
}

#[async_trait]
impl<'tp> Topology<'tp> for AmqpTopology<'tp> {
    fn queue(mut self, def: &'tp QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    async fn install(&self) -> Result<HashMap<String, QueueHandle>, AmqpError> {
        let mut handles = HashMap::new();

        for def in self.queues.iter().copied() {
            let handle = self.install_queue(def).await?;
            self.binding_queue(def).await?;
            handles.insert(def.name.clone(), handle);
        }

        Ok(handles)
    }
}

impl AmqpTopology<'_> {
    async fn install_queue(&self, def: &QueueDefinition) -> Result<QueueHandle, AmqpError> {
        info!("creating queue: {}", def.name);

        let handle = self
            .broker
            .declare_queue(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.auto_delete,
                    nowait: false,
                },
                queue_arguments(def),
            )
            .await?;

        info!(
            "queue {} - {} messages and {} consumers connected",
            handle.name(),
            handle.message_count(),
            handle.consumer_count()
        );

        Ok(handle)
    }

    async fn binding_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        for binding in &def.bindings {
            info!(
                "binding queue: {} to the exchange: {} with the key: {}",
                def.name, binding.exchange, binding.routing_key
            );

            self.broker
                .bind_queue(&def.name, &binding.exchange, &binding.routing_key)
                .await?;
        }

        debug!("queue {} was bound", def.name);

        Ok(())
    }
}

/// Builds the `x-*` declaration arguments of a queue.
///
/// Only arguments present in the definition are included; some brokers treat
/// an explicit null differently from a missing argument.
pub(crate) fn queue_arguments(def: &QueueDefinition) -> FieldTable {
    let mut args = BTreeMap::new();

    if let Some(exchange) = &def.dead_letter_exchange {
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            AMQPValue::LongString(LongString::from(exchange.clone())),
        );
    }

    if let Some(key) = &def.dead_letter_routing_key {
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
            AMQPValue::LongString(LongString::from(key.clone())),
        );
    }

    if let Some(max) = def.max_length {
        args.insert(
            ShortString::from(AMQP_HEADERS_MAX_LENGTH),
            AMQPValue::LongInt(LongInt::from(max)),
        );
    }

    if let Some(expires) = def.expires {
        args.insert(
            ShortString::from(AMQP_HEADERS_EXPIRES),
            AMQPValue::LongInt(LongInt::from(expires)),
        );
    }

    if let Some(ttl) = def.message_ttl {
        args.insert(
            ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
            AMQPValue::LongInt(LongInt::from(ttl)),
        );
    }

    FieldTable::from(args)
}
