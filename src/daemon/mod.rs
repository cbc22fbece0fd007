//! Daemon lifecycle: discovery, launch, and the long-running service.
//!
//! The well-known service port doubles as the launch mutex: whoever can
//! bind it knows no daemon is running and becomes the launcher. While the
//! daemon performs its multi-minute init, the launcher keeps that port as
//! a progress receiver; the daemon pushes short-lived connect-send-close
//! notifications at it. Once init completes the launcher releases the
//! port and, after a grace period, the daemon binds it for real.
//!
//! - `progress`: the `{type, message}` wire shape and the channel relay
//! - `launcher`: probe, detached spawn, progress wait
//! - `runtime`: the daemon process itself

pub mod launcher;
pub mod progress;
pub mod runtime;

pub use launcher::{start, LaunchOutcome};
