//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes when the agent receives SIGINT,
//! SIGTERM or SIGQUIT. SIGCHLD is absent here on purpose: it belongs
//! exclusively to the reaper.

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners, so concurrent waiters
/// all observe the signal.
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
