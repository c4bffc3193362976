//! Session ownership: PTY process adapter, registry, lifecycle controller.

pub mod controller;
pub mod pty;
pub mod registry;

pub use pty::{ExitEvent, PtyHandle, PtyStreams};
pub use registry::{Session, SessionRegistry, SessionState};
