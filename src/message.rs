// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Inbound Messages
//!
//! A [`Message`] is the handler-facing view of a RabbitMQ delivery. It keeps the
//! delivery tag so a terminal response can be correlated with the delivery, but
//! it carries no way to respond by itself: responses go through
//! [`AmqpProxy`](crate::response::AmqpProxy).

use lapin::{
    message::Delivery,
    protocol::basic::AMQPProperties,
    types::{AMQPValue, FieldTable},
};

/// A message received from a queue.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub body: Vec<u8>,
    pub headers: FieldTable,
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub properties: AMQPProperties,
}

impl Message {
    /// Creates a message with the given delivery tag and body and no headers.
    pub fn new(delivery_tag: u64, body: &[u8]) -> Message {
        Message {
            body: body.to_vec(),
            delivery_tag,
            ..Message::default()
        }
    }

    /// Sets the exchange and routing key the message was published with.
    pub fn routed(mut self, exchange: &str, routing_key: &str) -> Self {
        self.exchange = exchange.to_owned();
        self.routing_key = routing_key.to_owned();
        self
    }

    /// Replaces the message headers.
    pub fn headers(mut self, headers: FieldTable) -> Self {
        self.headers = headers;
        self
    }

    /// Looks up a header value by name.
    pub fn header(&self, key: &str) -> Option<&AMQPValue> {
        self.headers.inner().get(key)
    }
}

impl From<Delivery> for Message {
    fn from(delivery: Delivery) -> Self {
        let headers = delivery.properties.headers().clone().unwrap_or_default();

        Message {
            body: delivery.data,
            headers,
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            redelivered: delivery.redelivered,
            properties: delivery.properties,
        }
    }
}
