//! Running the assembled helper invocation.
//!
//! [`SandboxProcess`] spawns and supervises the helper; [`SecureProcess`]
//! wraps it for callers and decides whether the captured environment may be
//! read back. Both implement [`ProcessControl`].

mod handle;
mod secure;

pub use handle::{ProcessControl, ProcessStatus, SandboxProcess};
pub use secure::SecureProcess;
