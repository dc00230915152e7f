// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Consumers shipped with the dispatcher binary.

use crate::{
    consumer::{Consumer, HandlerError},
    message::Message,
    registry::ConsumerRegistry,
    response::AmqpProxy,
};
use async_trait::async_trait;
use tracing::{error, info};

/// Reference of [`LoggingConsumer`] in configuration files.
pub const LOGGING_CONSUMER: &str = "amqp_dispatcher.builtin:LoggingConsumer";

/// Logs every message it receives and acknowledges it.
#[derive(Debug, Default)]
pub struct LoggingConsumer;

#[async_trait]
impl Consumer for LoggingConsumer {
    async fn consume(&self, proxy: &mut AmqpProxy, message: &Message) -> Result<(), HandlerError> {
        info!(
            delivery_tag = message.delivery_tag,
            exchange = message.exchange,
            routing_key = message.routing_key,
            redelivered = message.redelivered,
            body = %String::from_utf8_lossy(&message.body),
            "message received"
        );

        proxy.acknowledge().await?;
        Ok(())
    }

    async fn shutdown(&self, error: Option<&HandlerError>) {
        if let Some(err) = error {
            error!(error = err.to_string(), "logging consumer failed");
        }
    }
}

/// Registers the built-in consumers.
pub fn register(registry: ConsumerRegistry) -> ConsumerRegistry {
    registry.register(LOGGING_CONSUMER, LoggingConsumer::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatcher::{dispatch, Disposition},
        test_support::{Action, RecordingBroker},
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn logging_consumer_acknowledges() {
        let registry = register(ConsumerRegistry::new());
        let consumer = registry.resolve(LOGGING_CONSUMER).unwrap();
        let broker = Arc::new(RecordingBroker::default());

        let disposition = dispatch(
            consumer.as_ref(),
            broker.clone(),
            "orders",
            Message::new(5, b"order-5"),
        )
        .await;

        assert_eq!(disposition, Disposition::Responded);
        assert_eq!(broker.responses(), vec![Action::Ack(5)]);
    }
}
