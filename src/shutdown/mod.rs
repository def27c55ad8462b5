//! Coordinated shutdown: signals, phases, hooks, tracked operations.
//!
//! ## Contents
//! - [`ShutdownCoordinator`] — the phase machine and hook runner
//! - [`ShutdownPhase`], [`ExitOutcome`] — observable sequence state
//! - [`OperationGuard`], [`TrackedOperation`] — in-flight work tracking
//! - [`wait_for_shutdown_signal`], [`TermSignal`] — cross-platform signal
//!   waiting, reporting which signal arrived
//! - `EXIT_*` — the process exit codes, distinct per fault class

mod coordinator;
mod signals;

pub use coordinator::{
    EXIT_CLEAN, EXIT_DEADLOCK, EXIT_FATAL, EXIT_FREEZE, EXIT_SHUTDOWN_ERROR, ExitOutcome,
    OperationGuard, ShutdownCoordinator, ShutdownPhase, TrackedOperation,
};
pub use signals::{TermSignal, wait_for_shutdown_signal};
