// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OS Signal Handling
//!
//! [`wait_for_shutdown_signal`] completes when the process is asked to stop.
//!
//! - Unix: `SIGINT`, `SIGTERM`, `SIGQUIT`.
//! - Elsewhere: Ctrl-C.

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
