//! # Termination signals.
//!
//! [`wait_for_shutdown_signal`] completes on the first of:
//! - Unix: `SIGINT`, `SIGTERM`, `SIGQUIT`
//! - elsewhere: Ctrl-C
//!
//! Failing to install a listener is fatal for the host: it could never be
//! stopped cleanly.

use crate::error::RuntimeError;

fn fatal(err: std::io::Error) -> RuntimeError {
    RuntimeError::Fatal {
        reason: format!("cannot listen for termination signals: {err}"),
    }
}

#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> Result<(), RuntimeError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).map_err(fatal)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(fatal)?;
    let mut sigquit = signal(SignalKind::quit()).map_err(fatal)?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> Result<(), RuntimeError> {
    tokio::signal::ctrl_c().await.map_err(fatal)
}
