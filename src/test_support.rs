// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker used by unit tests. It records every command it receives
//! and serves deliveries pushed through an unbounded channel.

use crate::{
    channel::{Broker, BrokerConnection, DeliveryStream},
    errors::AmqpError,
    message::Message,
    publisher::PublishMessage,
    queue::QueueHandle,
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use lapin::{options::QueueDeclareOptions, types::FieldTable};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;

pub(crate) type DeliverySender = mpsc::UnboundedSender<Result<Message, AmqpError>>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Declare(String),
    Bind(String, String, String),
    Qos(u16),
    Consume(String),
    Cancel(String),
    Ack(u64),
    Nack(u64),
    Reject(u64, bool),
    Publish(PublishMessage),
    Close,
}

impl Action {
    fn is_response(&self) -> bool {
        matches!(self, Action::Ack(_) | Action::Nack(_) | Action::Reject(_, _))
    }
}

#[derive(Default)]
pub(crate) struct RecordingBroker {
    actions: Mutex<Vec<Action>>,
    deliveries: Mutex<Option<mpsc::UnboundedReceiver<Result<Message, AmqpError>>>>,
    fail_responses: bool,
}

impl RecordingBroker {
    /// A broker whose ack/nack/reject commands all fail.
    pub(crate) fn failing_responses() -> RecordingBroker {
        RecordingBroker {
            fail_responses: true,
            ..RecordingBroker::default()
        }
    }

    /// A broker whose consumer stream yields what is sent on the returned
    /// sender and ends when the sender is dropped.
    pub(crate) fn with_deliveries() -> (RecordingBroker, DeliverySender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = RecordingBroker {
            deliveries: Mutex::new(Some(rx)),
            ..RecordingBroker::default()
        };
        (broker, tx)
    }

    pub(crate) fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    pub(crate) fn responses(&self) -> Vec<Action> {
        self.actions()
            .into_iter()
            .filter(Action::is_response)
            .collect()
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }

    fn respond(&self, action: Action, err: AmqpError) -> Result<(), AmqpError> {
        self.record(action);
        if self.fail_responses {
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn declare_queue(
        &self,
        name: &str,
        _options: QueueDeclareOptions,
        _arguments: FieldTable,
    ) -> Result<QueueHandle, AmqpError> {
        self.record(Action::Declare(name.to_owned()));
        Ok(QueueHandle::new(name, 0, 0))
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        self.record(Action::Bind(
            queue.to_owned(),
            exchange.to_owned(),
            routing_key.to_owned(),
        ));
        Ok(())
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.record(Action::Qos(prefetch_count));
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        self.record(Action::Consume(queue.to_owned()));

        match self.deliveries.lock().unwrap().take() {
            Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|delivery| (delivery, rx))
            })
            .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.record(Action::Cancel(consumer_tag.to_owned()));
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.respond(Action::Ack(delivery_tag), AmqpError::AckMessageError)
    }

    async fn nack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.respond(Action::Nack(delivery_tag), AmqpError::NackMessageError)
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.respond(
            Action::Reject(delivery_tag, requeue),
            AmqpError::RejectMessageError,
        )
    }

    async fn publish(&self, message: PublishMessage) -> Result<(), AmqpError> {
        self.record(Action::Publish(message));
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.record(Action::Close);
        Ok(())
    }
}

/// Connection handing out a fresh [`RecordingBroker`] per channel, or the
/// prepared ones first, in order.
#[derive(Default)]
pub(crate) struct RecordingConnection {
    prepared: Mutex<VecDeque<RecordingBroker>>,
    channels: Mutex<Vec<Arc<RecordingBroker>>>,
    closed: Mutex<bool>,
}

impl RecordingConnection {
    /// Queues `channel` to be handed out by the next unserved `channel()` call.
    pub(crate) fn prepare(&self, channel: RecordingBroker) {
        self.prepared.lock().unwrap().push_back(channel);
    }

    pub(crate) fn channels(&self) -> Vec<Arc<RecordingBroker>> {
        self.channels.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl BrokerConnection for RecordingConnection {
    type Channel = RecordingBroker;

    async fn channel(&self) -> Result<Arc<RecordingBroker>, AmqpError> {
        let prepared = self.prepared.lock().unwrap().pop_front();
        let channel = Arc::new(prepared.unwrap_or_default());
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel)
    }

    async fn close(&self) -> Result<(), AmqpError> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}
