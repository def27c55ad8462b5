//! # Termination-signal interception.
//!
//! [`wait_for_shutdown_signal`] suspends until the process receives a
//! termination signal and reports which one arrived, so the coordinator
//! can name it in the shutdown reason.
//!
//! Listeners are registered fresh on every call; in continuous mode the
//! coordinator simply waits again after each reset.

/// The termination signal that ended a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// `SIGINT` — Ctrl-C in a terminal. The only variant reported on
    /// non-Unix platforms.
    Interrupt,
    /// `SIGTERM` — the default kill signal (systemd, Kubernetes).
    Terminate,
    /// `SIGQUIT` — hard-stop request.
    Quit,
}

impl TermSignal {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TermSignal::Interrupt => "sigint",
            TermSignal::Terminate => "sigterm",
            TermSignal::Quit => "sigquit",
        }
    }
}

/// Suspends until a termination signal arrives, reporting which one.
///
/// Errors only if listener registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<TermSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        _ = interrupt.recv() => TermSignal::Interrupt,
        _ = terminate.recv() => TermSignal::Terminate,
        _ = quit.recv() => TermSignal::Quit,
    };
    Ok(received)
}

/// Suspends until Ctrl-C on platforms without Unix signal delivery.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<TermSignal> {
    tokio::signal::ctrl_c().await.map(|_| TermSignal::Interrupt)
}
