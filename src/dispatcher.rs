// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! This module drives consumption: a [`DispatchLoop`] pulls deliveries from one
//! queue and runs a consumer on each of them, and [`RabbitMQDispatcher`] wires
//! the configured loops together and shuts them down.
//!
//! Every delivery goes through the same lifecycle:
//!
//! 1. the loop waits for a free prefetch slot and the next delivery;
//! 2. the [`WaitGroup`] is entered and a fresh [`AmqpProxy`] is built;
//! 3. the consumer runs in its own task;
//! 4. if it returned without responding, the message is acknowledged; if it
//!    failed (or panicked), `shutdown` is called on the consumer and the
//!    message, if still unresolved, is rejected with requeue;
//! 5. the [`WaitGroup`] is left.
//!
//! A failing consumer never stops its loop. Loops end when their delivery
//! stream ends or when shutdown is requested; invocations already running are
//! always allowed to finish.

use crate::{
    channel::{Broker, BrokerConnection, DeliveryStream},
    config::DispatcherConfig,
    consumer::{Consumer, HandlerError},
    errors::AmqpError,
    message::Message,
    otel,
    queue::QueueHandle,
    registry::ConsumerRegistry,
    response::AmqpProxy,
    topology::{AmqpTopology, Topology},
    wait_group::WaitGroup,
};
use futures_util::{future::join_all, FutureExt, StreamExt};
use opentelemetry::{
    global,
    trace::{Span, Status},
};
use std::{any::Any, borrow::Cow, panic::AssertUnwindSafe, sync::Arc};
use tokio::{sync::Semaphore, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a delivery was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The consumer responded itself.
    Responded,
    /// The consumer returned without responding; the message was acknowledged.
    Acknowledged,
    /// The consumer failed without responding; the message was requeued.
    Requeued,
    /// The consumer failed after responding.
    FailedAfterResponse,
}

/// Consumes one queue with one consumer instance.
pub struct DispatchLoop<B: Broker + 'static> {
    queue: QueueHandle,
    consumer_tag: String,
    prefetch_count: u16,
    broker: Arc<B>,
    consumer: Arc<dyn Consumer>,
    wait_group: Arc<WaitGroup>,
}

impl<B: Broker + 'static> DispatchLoop<B> {
    /// Creates a loop consuming `queue` on `broker`.
    ///
    /// At most `prefetch_count` invocations of `consumer` run at a time. A zero
    /// prefetch count is treated as one.
    ///
    /// # Parameters
    /// * `queue` - The declared queue to consume
    /// * `broker` - The channel dedicated to this loop
    /// * `consumer` - The consumer instance every delivery is handed to
    /// * `prefetch_count` - Broker prefetch and local concurrency limit
    /// * `wait_group` - Tracks in-flight invocations for shutdown
    pub fn new(
        queue: QueueHandle,
        broker: Arc<B>,
        consumer: Arc<dyn Consumer>,
        prefetch_count: u16,
        wait_group: Arc<WaitGroup>,
    ) -> DispatchLoop<B> {
        let consumer_tag = format!("{}-{}", queue.name(), Uuid::new_v4());

        DispatchLoop {
            queue,
            consumer_tag,
            prefetch_count: prefetch_count.max(1),
            broker,
            consumer,
            wait_group,
        }
    }

    /// The tag this loop registers with the broker, `<queue>-<uuid>`.
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Applies the prefetch limit and registers the consumer with the broker.
    pub async fn subscribe(&self) -> Result<DeliveryStream, AmqpError> {
        self.broker.qos(self.prefetch_count).await?;
        let deliveries = self
            .broker
            .consume(self.queue.name(), &self.consumer_tag)
            .await?;

        debug!(
            queue = self.queue.name(),
            consumer_tag = self.consumer_tag,
            prefetch_count = self.prefetch_count,
            "consumer registered"
        );

        Ok(deliveries)
    }

    /// Dispatches deliveries until the stream ends or `shutdown` is cancelled.
    ///
    /// On shutdown the broker consumer is cancelled; in-flight invocations keep
    /// running and are tracked by the wait group.
    pub async fn run(self, mut deliveries: DeliveryStream, shutdown: CancellationToken) {
        let slots = Arc::new(Semaphore::new(self.prefetch_count as usize));

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = deliveries.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    error!(error = err.to_string(), queue = self.queue.name(), "errors consume msg");
                    continue;
                }
                None => {
                    info!(queue = self.queue.name(), "delivery stream closed");
                    break;
                }
            };

            let guard = self.wait_group.guard();
            let broker: Arc<dyn Broker> = self.broker.clone();
            let consumer = self.consumer.clone();
            let queue = self.queue.name().to_owned();

            tokio::spawn(async move {
                dispatch(consumer.as_ref(), broker, &queue, message).await;
                drop(guard);
                drop(permit);
            });
        }

        if shutdown.is_cancelled() {
            debug!(consumer_tag = self.consumer_tag, "cancelling consumer");
            if let Err(err) = self.broker.cancel(&self.consumer_tag).await {
                warn!(error = err.to_string(), "failure to cancel consumer");
            }
        }
    }
}

/// Runs `consumer` on one delivery and settles it.
pub(crate) async fn dispatch(
    consumer: &dyn Consumer,
    broker: Arc<dyn Broker>,
    queue: &str,
    message: Message,
) -> Disposition {
    let tracer = global::tracer("amqp consumer");
    let (ctx, mut span) = otel::new_span(&message.headers, &tracer, queue);

    debug!(
        queue,
        delivery_tag = message.delivery_tag,
        exchange = message.exchange,
        routing_key = message.routing_key,
        "a message was received"
    );

    let mut proxy = AmqpProxy::new(message.delivery_tag, broker, ctx);

    let result = AssertUnwindSafe(consumer.consume(&mut proxy, &message))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(AmqpError::ConsumerPanicked(panic_message(panic)).into()));

    match result {
        Ok(()) if proxy.has_responded() => {
            span.set_status(Status::Ok);
            Disposition::Responded
        }
        Ok(()) => {
            debug!("message successfully processed");
            if let Err(err) = proxy.acknowledge().await {
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("error to ack msg"),
                });
            } else {
                span.set_status(Status::Ok);
            }
            Disposition::Acknowledged
        }
        Err(err) => {
            report(&err, queue, message.delivery_tag);
            span.record_error(&*err);
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });

            if let Err(panic) = AssertUnwindSafe(consumer.shutdown(Some(&err)))
                .catch_unwind()
                .await
            {
                error!(
                    queue,
                    delivery_tag = message.delivery_tag,
                    error = panic_message(panic),
                    "consumer shutdown panicked"
                );
            }

            if proxy.has_responded() {
                return Disposition::FailedAfterResponse;
            }

            warn!(delivery_tag = proxy.delivery_tag(), "requeuing unresolved message");
            if let Err(err) = proxy.reject(true).await {
                span.record_error(&err);
            }
            Disposition::Requeued
        }
    }
}

fn report(err: &HandlerError, queue: &str, delivery_tag: u64) {
    match err.downcast_ref::<AmqpError>() {
        Some(AmqpError::AlreadyResponded(_)) => error!(
            queue,
            delivery_tag,
            error = err.to_string(),
            "consumer responded more than once to the same message"
        ),
        _ => error!(
            queue,
            delivery_tag,
            error = err.to_string(),
            "consumer failed to handle message"
        ),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        return (*msg).to_owned();
    }
    if let Some(msg) = panic.downcast_ref::<String>() {
        return msg.clone();
    }
    "unknown panic".to_owned()
}

/// Runs every configured consumer against its queue until shutdown.
pub struct RabbitMQDispatcher {
    config: DispatcherConfig,
    registry: ConsumerRegistry,
    wait_group: Arc<WaitGroup>,
}

impl RabbitMQDispatcher {
    /// Creates a dispatcher for the queues and consumers in `config`.
    ///
    /// # Parameters
    /// * `config` - Queues to declare and consumers to run
    /// * `registry` - Resolves the consumer references found in `config`
    pub fn new(config: DispatcherConfig, registry: ConsumerRegistry) -> RabbitMQDispatcher {
        RabbitMQDispatcher {
            config,
            registry,
            wait_group: Arc::new(WaitGroup::new()),
        }
    }

    /// Tracks the handler invocations of every loop started by this dispatcher.
    pub fn wait_group(&self) -> Arc<WaitGroup> {
        self.wait_group.clone()
    }

    /// Installs the topology, starts the loops and blocks until they stop.
    ///
    /// Loops stop when `shutdown` is cancelled or when their delivery streams
    /// end. The dispatcher then waits for in-flight invocations to finish and
    /// closes every channel it opened, then the connection. Topology and
    /// subscription failures abort startup.
    ///
    /// # Parameters
    /// * `connection` - The connection channels are opened on
    /// * `shutdown` - Cancelled to stop consuming
    ///
    /// # Returns
    /// * `Result<(), AmqpError>` - Ok once drained and closed, or the startup error
    pub async fn run<C: BrokerConnection>(
        &self,
        connection: &C,
        shutdown: CancellationToken,
    ) -> Result<(), AmqpError> {
        let shutdown = shutdown.child_token();
        let mut started = Started::default();

        if let Err(err) = self.start(connection, &shutdown, &mut started).await {
            error!(error = err.to_string(), "failure to start the dispatcher");
            shutdown.cancel();
            join_all(started.loops).await;
            self.wait_group.wait().await;
            close(connection, &started.channels).await;
            return Err(err);
        }

        info!(loops = started.loops.len(), "dispatcher started");

        for res in join_all(started.loops).await {
            if let Err(err) = res {
                error!(error = err.to_string(), "dispatch loop aborted");
            }
        }

        info!(
            in_flight = self.wait_group.count(),
            "waiting for in-flight messages"
        );
        self.wait_group.wait().await;

        close(connection, &started.channels).await;
        info!("dispatcher stopped");

        Ok(())
    }

    async fn start<C: BrokerConnection>(
        &self,
        connection: &C,
        shutdown: &CancellationToken,
        started: &mut Started,
    ) -> Result<(), AmqpError> {
        let channel: Arc<dyn Broker> = connection.channel().await?;
        started.channels.push(channel.clone());
        let queues = AmqpTopology::from_definitions(channel, &self.config.queues)
            .install()
            .await?;

        for def in &self.config.consumers {
            let Some(queue) = queues.get(&def.queue) else {
                error!(queue = def.queue, "consumer references an undeclared queue");
                return Err(AmqpError::UnknownQueue(def.queue.clone()));
            };

            for replica in 0..def.consumer_count.max(1) {
                let consumer = self.registry.resolve(&def.consumer)?;
                let broker = connection.channel().await?;
                started.channels.push(broker.clone());

                let dispatch_loop = DispatchLoop::new(
                    queue.clone(),
                    broker,
                    consumer,
                    def.prefetch_count,
                    self.wait_group.clone(),
                );
                let deliveries = dispatch_loop.subscribe().await?;

                info!(
                    queue = def.queue,
                    consumer = def.consumer,
                    replica,
                    prefetch_count = def.prefetch_count,
                    "starting consumer"
                );
                started
                    .loops
                    .push(tokio::spawn(dispatch_loop.run(deliveries, shutdown.clone())));
            }
        }

        Ok(())
    }
}

/// Loops and channels opened so far, torn down together.
#[derive(Default)]
struct Started {
    loops: Vec<JoinHandle<()>>,
    channels: Vec<Arc<dyn Broker>>,
}

async fn close<C: BrokerConnection>(connection: &C, channels: &[Arc<dyn Broker>]) {
    for res in join_all(channels.iter().map(|channel| channel.close())).await {
        if let Err(err) = res {
            warn!(error = err.to_string(), "failure to close a channel");
        }
    }

    if let Err(err) = connection.close().await {
        warn!(error = err.to_string(), "failure to close the connection");
    }
}
