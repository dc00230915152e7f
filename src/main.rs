// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use amqp_dispatcher::{
    app::{self, Args},
    builtin,
    registry::ConsumerRegistry,
};
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let registry = builtin::register(ConsumerRegistry::new());

    match app::run(args, registry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = err.to_string(), "amqp-dispatcher failed");
            ExitCode::FAILURE
        }
    }
}
