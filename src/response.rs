// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Responses
//!
//! Every delivery must receive exactly one terminal response: ack, nack or
//! reject. [`ResponseGate`] records whether that response has been given and
//! refuses a second one; [`AmqpProxy`] is the surface handlers use to respond
//! and to publish follow-up messages.
//!
//! A gate and its proxy are owned by the single handler invocation processing
//! the delivery, so neither needs any synchronization.

use crate::{
    channel::Broker,
    errors::AmqpError,
    otel,
    publisher::{HeaderValue, PublishMessage},
};
use opentelemetry::Context;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error};

/// Terminal-state tracker for one delivery.
#[derive(Debug)]
pub struct ResponseGate {
    delivery_tag: u64,
    terminal: bool,
}

impl ResponseGate {
    /// Creates an open gate for the delivery `delivery_tag`.
    pub fn new(delivery_tag: u64) -> ResponseGate {
        ResponseGate {
            delivery_tag,
            terminal: false,
        }
    }

    /// The delivery this gate guards.
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// Whether a terminal response has been claimed.
    pub fn has_responded(&self) -> bool {
        self.terminal
    }

    /// Claims the terminal response for `action`.
    ///
    /// Only the first claim succeeds.
    pub fn close(&mut self, action: &str) -> Result<(), AmqpError> {
        if self.terminal {
            error!(
                delivery_tag = self.delivery_tag,
                action, "already responded to message"
            );
            return Err(AmqpError::AlreadyResponded(self.delivery_tag));
        }

        self.terminal = true;
        Ok(())
    }
}

/// Handler-facing proxy for one delivery.
pub struct AmqpProxy {
    gate: ResponseGate,
    broker: Arc<dyn Broker>,
    ctx: Context,
}

impl AmqpProxy {
    /// Creates a proxy for the delivery `delivery_tag` received on `broker`.
    ///
    /// # Parameters
    /// * `delivery_tag` - The delivery to respond to
    /// * `broker` - The channel the delivery arrived on
    /// * `ctx` - The context of the span processing the delivery, injected
    ///   into published messages
    pub fn new(delivery_tag: u64, broker: Arc<dyn Broker>, ctx: Context) -> AmqpProxy {
        AmqpProxy {
            gate: ResponseGate::new(delivery_tag),
            broker,
            ctx,
        }
    }

    /// The delivery this proxy responds to.
    pub fn delivery_tag(&self) -> u64 {
        self.gate.delivery_tag()
    }

    /// Whether the delivery was acknowledged, nacked or rejected.
    pub fn has_responded(&self) -> bool {
        self.gate.has_responded()
    }

    /// Acknowledges the delivery.
    pub async fn acknowledge(&mut self) -> Result<(), AmqpError> {
        self.gate.close("ack")?;
        debug!(delivery_tag = self.delivery_tag(), "ack");
        self.broker.ack(self.delivery_tag()).await
    }

    /// Negatively acknowledges the delivery; the broker requeues it.
    pub async fn negative_acknowledge(&mut self) -> Result<(), AmqpError> {
        self.gate.close("nack")?;
        debug!(delivery_tag = self.delivery_tag(), "nack");
        self.broker.nack(self.delivery_tag()).await
    }

    /// Rejects the delivery, optionally requeuing it.
    pub async fn reject(&mut self, requeue: bool) -> Result<(), AmqpError> {
        self.gate.close("reject")?;
        debug!(delivery_tag = self.delivery_tag(), requeue, "reject");
        self.broker.reject(self.delivery_tag(), requeue).await
    }

    /// Publishes a message on the channel the delivery arrived on.
    ///
    /// Publishing is not a response; it can be done any number of times, before
    /// or after responding.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: HashMap<String, HeaderValue>,
        body: &[u8],
    ) -> Result<(), AmqpError> {
        let mut message = PublishMessage::new(exchange, routing_key, body).with_headers(headers);
        otel::inject(&self.ctx, &mut message.headers);

        self.broker.publish(message).await
    }
}
