// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Process Entry Point
//!
//! Command-line arguments and the startup/shutdown sequence of a dispatcher
//! process. Binaries build a [`ConsumerRegistry`] with their own consumers and
//! hand it to [`run`].

use crate::{
    channel::{AmqpConnection, BrokerConnection},
    config::{DispatcherConfig, RabbitMQConfig},
    dispatcher::RabbitMQDispatcher,
    errors::AmqpError,
    registry::ConsumerRegistry,
    signals,
};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "amqp-dispatcher", about = "Dispatch AMQP messages to consumers")]
pub struct Args {
    /// Path to the config file
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    /// Validate the config file and exit
    #[arg(long, default_value_t = false)]
    pub validate: bool,
}

/// Loads and validates the configuration, then runs the dispatcher until a
/// shutdown signal is received.
pub async fn run(args: Args, registry: ConsumerRegistry) -> Result<(), AmqpError> {
    let config = DispatcherConfig::from_file(&args.config)?;
    config.validate(&registry)?;

    if args.validate {
        info!(path = %args.config.display(), "configuration is valid");
        return Ok(());
    }

    run_startup_handler(&config, &registry)?;

    let rabbitmq = RabbitMQConfig::from_env()?;
    let connection = AmqpConnection::connect(&rabbitmq).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match signals::wait_for_shutdown_signal().await {
                Ok(()) => info!("shutdown requested"),
                Err(err) => error!(error = err.to_string(), "failure to listen for signals"),
            }
            shutdown.cancel();
        }
    });

    serve(&connection, config, registry, shutdown).await
}

/// Runs the dispatcher on an established connection.
pub async fn serve<C: BrokerConnection>(
    connection: &C,
    config: DispatcherConfig,
    registry: ConsumerRegistry,
    shutdown: CancellationToken,
) -> Result<(), AmqpError> {
    RabbitMQDispatcher::new(config, registry)
        .run(connection, shutdown)
        .await
}

fn run_startup_handler(
    config: &DispatcherConfig,
    registry: &ConsumerRegistry,
) -> Result<(), AmqpError> {
    let Some(reference) = &config.startup_handler else {
        return Ok(());
    };

    let hook = registry.resolve_startup_hook(reference)?;
    hook().map_err(|err| AmqpError::StartupError(reference.clone(), err.to_string()))?;
    info!(handler = reference, "startup handled");

    Ok(())
}
