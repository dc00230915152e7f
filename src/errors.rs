// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Dispatcher
//!
//! This module provides the error type shared by every layer of the dispatcher:
//! configuration loading, topology installation, broker commands issued by the
//! dispatch loop and the response contract handlers must honor.

use thiserror::Error;

/// Represents errors that can occur while dispatching AMQP messages.
///
/// Topology and configuration variants are fatal at startup. Broker command
/// variants are reported per message. `AlreadyResponded` is a handler bug and
/// is never swallowed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error closing a channel or connection
    #[error("failure to close `{0}`")]
    CloseError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    BindingExchangeToQueueError(String, String),

    /// Error binding a consumer to a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error cancelling a consumer
    #[error("failure to cancel consumer `{0}`")]
    CancelConsumerError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error rejecting a message
    #[error("failure to reject message")]
    RejectMessageError,

    /// A second terminal response was attempted for the same delivery
    #[error("already responded to message `{0}`")]
    AlreadyResponded(u64),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error receiving a delivery from a consumer stream
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// A handler panicked while consuming a message
    #[error("consumer panicked `{0}`")]
    ConsumerPanicked(String),

    /// A consumer reference is not of the form `module:SymbolName`
    #[error("invalid consumer reference `{0}`")]
    InvalidConsumerReference(String),

    /// A consumer reference has no registered factory
    #[error("unknown consumer `{0}`")]
    UnknownConsumer(String),

    /// A consumer references a queue that was never declared
    #[error("unknown queue `{0}`")]
    UnknownQueue(String),

    /// Error loading or validating configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The startup handler failed
    #[error("startup handler `{0}` failed: {1}")]
    StartupError(String, String),
}
