// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Registry
//!
//! Configuration names consumers with `module:SymbolName` references. The
//! registry maps each reference to a factory registered at compile time and
//! builds a fresh consumer instance for every dispatch loop. Startup hooks are
//! registered and resolved the same way.

use crate::{
    consumer::{Consumer, HandlerError},
    errors::AmqpError,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Builds a consumer instance.
pub type ConsumerFactory = Arc<dyn Fn() -> Arc<dyn Consumer> + Send + Sync>;

/// Runs once before the dispatcher connects to the broker.
pub type StartupHook = Arc<dyn Fn() -> Result<(), HandlerError> + Send + Sync>;

/// Factories for consumers and startup hooks, keyed by reference.
#[derive(Clone, Default)]
pub struct ConsumerRegistry {
    consumers: HashMap<String, ConsumerFactory>,
    startup_hooks: HashMap<String, StartupHook>,
}

/// Splits a `module:SymbolName` reference into its two parts.
pub fn parse_reference(reference: &str) -> Result<(&str, &str), AmqpError> {
    match reference.split_once(':') {
        Some((module, symbol))
            if !module.is_empty() && !symbol.is_empty() && !symbol.contains(':') =>
        {
            Ok((module, symbol))
        }
        _ => Err(AmqpError::InvalidConsumerReference(reference.to_owned())),
    }
}

impl ConsumerRegistry {
    /// Creates an empty registry.
    pub fn new() -> ConsumerRegistry {
        ConsumerRegistry::default()
    }

    /// Registers a consumer factory under `reference`.
    pub fn register<F, C>(mut self, reference: &str, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Consumer + 'static,
    {
        self.consumers.insert(
            reference.to_owned(),
            Arc::new(move || Arc::new(factory()) as Arc<dyn Consumer>),
        );
        self
    }

    /// Registers a startup hook under `reference`.
    pub fn startup_hook<F>(mut self, reference: &str, hook: F) -> Self
    where
        F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.startup_hooks
            .insert(reference.to_owned(), Arc::new(hook));
        self
    }

    /// Checks that `reference` is well formed and has a registered consumer.
    pub fn check(&self, reference: &str) -> Result<(), AmqpError> {
        parse_reference(reference)?;
        if !self.consumers.contains_key(reference) {
            return Err(AmqpError::UnknownConsumer(reference.to_owned()));
        }
        Ok(())
    }

    /// Builds a new consumer instance for `reference`.
    pub fn resolve(&self, reference: &str) -> Result<Arc<dyn Consumer>, AmqpError> {
        parse_reference(reference)?;
        debug!(consumer = reference, "loading consumer");

        match self.consumers.get(reference) {
            Some(factory) => Ok(factory()),
            None => Err(AmqpError::UnknownConsumer(reference.to_owned())),
        }
    }

    /// Returns the startup hook registered under `reference`.
    pub fn resolve_startup_hook(&self, reference: &str) -> Result<StartupHook, AmqpError> {
        parse_reference(reference)?;

        self.startup_hooks
            .get(reference)
            .cloned()
            .ok_or_else(|| AmqpError::UnknownConsumer(reference.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{message::Message, response::AmqpProxy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl Consumer for Noop {
        async fn consume(&self, _: &mut AmqpProxy, _: &Message) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn parse_reference_requires_module_and_symbol() {
        assert_eq!(
            parse_reference("workers.orders:Consumer"),
            Ok(("workers.orders", "Consumer"))
        );

        for bad in ["Consumer", ":Consumer", "workers:", "a:b:c", ""] {
            assert_eq!(
                parse_reference(bad),
                Err(AmqpError::InvalidConsumerReference(bad.to_owned()))
            );
        }
    }

    #[test]
    fn resolve_builds_a_fresh_instance_each_time() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = ConsumerRegistry::new().register("workers:Noop", {
            let built = built.clone();
            move || {
                built.fetch_add(1, Ordering::SeqCst);
                Noop
            }
        });

        let first = registry.resolve("workers:Noop").unwrap();
        let second = registry.resolve("workers:Noop").unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_and_malformed_references_fail() {
        let registry = ConsumerRegistry::new().register("workers:Noop", || Noop);

        assert!(registry.check("workers:Noop").is_ok());
        assert_eq!(
            registry.check("workers:Other").err(),
            Some(AmqpError::UnknownConsumer("workers:Other".to_owned()))
        );
        assert_eq!(
            registry.resolve("Noop").err(),
            Some(AmqpError::InvalidConsumerReference("Noop".to_owned()))
        );
    }

    #[test]
    fn startup_hooks_resolve_by_reference() {
        let registry = ConsumerRegistry::new().startup_hook("workers:init", || Ok(()));

        let hook = registry.resolve_startup_hook("workers:init").unwrap();
        assert!(hook().is_ok());
        assert!(registry.resolve_startup_hook("workers:missing").is_err());
    }
}
