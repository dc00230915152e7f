// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module defines the broker-facing seam of the dispatcher and its `lapin`
//! implementation.
//!
//! - [`Broker`]: the commands the dispatcher issues on one channel (declare, bind,
//!   qos, consume, respond, publish).
//! - [`BrokerConnection`]: a connection able to open independent channels.
//! - [`AmqpConnection`] / [`AmqpChannel`]: the RabbitMQ implementation.
//!
//! Delivery tags are scoped to a channel, so the channel that consumed a message
//! is the one that must respond to it.

use crate::{
    config::RabbitMQConfig, errors::AmqpError, message::Message, publisher::PublishMessage,
    queue::QueueHandle,
};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use lapin::{
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicPublishOptions, BasicQosOptions, BasicRejectOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{FieldTable, LongString},
    Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error, info};

#[cfg(test)]
use mockall::automock;

/// Stream of deliveries produced by [`Broker::consume`].
pub type DeliveryStream = BoxStream<'static, Result<Message, AmqpError>>;

/// Commands issued by the dispatcher on a single broker channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a queue and returns a handle to it.
    async fn declare_queue(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<QueueHandle, AmqpError>;

    /// Binds a queue to an exchange with a routing key.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError>;

    /// Limits the number of unacknowledged deliveries on this channel.
    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError>;

    /// Starts consuming from a queue with manual acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError>;

    /// Stops a consumer; already-delivered messages stay unacknowledged.
    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    async fn nack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;

    async fn publish(&self, message: PublishMessage) -> Result<(), AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// A broker connection that hands out channels.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    type Channel: Broker + 'static;

    /// Opens a new, independent channel.
    async fn channel(&self) -> Result<Arc<Self::Channel>, AmqpError>;

    /// Closes the connection and every channel opened on it.
    async fn close(&self) -> Result<(), AmqpError>;
}

/// A RabbitMQ connection backed by `lapin`.
pub struct AmqpConnection {
    conn: Connection,
}

impl AmqpConnection {
    /// Connects to RabbitMQ using the URI and connection name in `cfg`.
    ///
    /// Connection loss is logged; it surfaces to the dispatch loops as the end of
    /// their delivery streams.
    pub async fn connect(cfg: &RabbitMQConfig) -> Result<AmqpConnection, AmqpError> {
        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(cfg.connection_name.clone()));

        let conn = match Connection::connect(&cfg.amqp_uri(), options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError)
            }
        }?;

        conn.on_error(|err| {
            info!(error = err.to_string(), "amqp broker connection closed");
        });

        debug!(name = cfg.connection_name, "amqp connected");
        Ok(AmqpConnection { conn })
    }
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    type Channel = AmqpChannel;

    async fn channel(&self) -> Result<Arc<AmqpChannel>, AmqpError> {
        debug!("creating amqp channel...");
        match self.conn.create_channel().await {
            Ok(channel) => {
                debug!(id = channel.id(), "channel created");
                Ok(Arc::new(AmqpChannel { channel }))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        match self.conn.close(200, "OK").await {
            Ok(_) => {
                debug!("amqp connection closed");
                Ok(())
            }
            Err(err) => {
                error!(error = err.to_string(), "error to close the connection");
                Err(AmqpError::CloseError("connection".to_owned()))
            }
        }
    }
}

/// A single RabbitMQ channel.
pub struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl Broker for AmqpChannel {
    async fn declare_queue(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<QueueHandle, AmqpError> {
        match self.channel.queue_declare(name, options, arguments).await {
            Ok(queue) => Ok(QueueHandle::new(
                queue.name().as_str(),
                queue.message_count(),
                queue.consumer_count(),
            )),
            Err(err) => {
                error!(error = err.to_string(), queue = name, "error to declare the queue");
                Err(AmqpError::DeclareQueueError(name.to_owned()))
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        match self
            .channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    exchange.to_owned(),
                    queue.to_owned(),
                ))
            }
        }
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        match self
            .channel
            .basic_qos(prefetch_count, BasicQosOptions { global: false })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "error to configure qos");
                Err(AmqpError::QoSDeclarationError(err.to_string()))
            }
        }
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        let consumer = match self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::BindingConsumerError(queue.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        Ok(consumer
            .map(|result| {
                result
                    .map(Message::from)
                    .map_err(|err| AmqpError::ConsumerError(err.to_string()))
            })
            .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        match self
            .channel
            .basic_cancel(consumer_tag, BasicCancelOptions { nowait: false })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "error to cancel the consumer");
                Err(AmqpError::CancelConsumerError(consumer_tag.to_owned()))
            }
        }
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        match self
            .channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), delivery_tag, "error whiling ack msg");
                Err(AmqpError::AckMessageError)
            }
        }
    }

    async fn nack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        match self
            .channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: true,
                },
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), delivery_tag, "error whiling nack msg");
                Err(AmqpError::NackMessageError)
            }
        }
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        match self
            .channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), delivery_tag, "error whiling reject msg");
                Err(AmqpError::RejectMessageError)
            }
        }
    }

    async fn publish(&self, message: PublishMessage) -> Result<(), AmqpError> {
        match self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &message.body,
                message.properties(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if !self.channel.status().connected() {
            return Ok(());
        }

        match self.channel.close(200, "OK").await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(error = err.to_string(), "error to close the channel");
                Err(AmqpError::CloseError(format!("channel {}", self.channel.id())))
            }
        }
    }
}
