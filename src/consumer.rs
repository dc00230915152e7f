// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Contract
//!
//! A [`Consumer`] handles the messages of one dispatch loop. It receives each
//! message together with an [`AmqpProxy`] it uses to respond.
//!
//! Responding is optional. When `consume` returns `Ok` without responding the
//! dispatcher acknowledges the message; when it fails without responding the
//! dispatcher rejects it with requeue. Responding twice is an error.

use crate::{message::Message, response::AmqpProxy};
use async_trait::async_trait;

/// Error returned by a consumer.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A message handler.
///
/// One instance is built per dispatch loop and shared by the concurrent
/// invocations of that loop, up to its prefetch count.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Processes one message.
    async fn consume(&self, proxy: &mut AmqpProxy, message: &Message) -> Result<(), HandlerError>;

    /// Called once after `consume` fails, with the error it failed with.
    ///
    /// Not called when the process shuts down gracefully.
    async fn shutdown(&self, _error: Option<&HandlerError>) {}
}
