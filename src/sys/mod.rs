//! Platform-specific kernel binding layer.
//!
//! This module provides a unified interface over the two supported
//! readiness mechanisms: the Linux descriptor multiplexer (`epoll`) and
//! the macOS filter-based event queue (`kqueue`/`kevent64`).
//!
//! The concrete implementation is selected at compile time depending on
//! the target operating system.

use thiserror::Error;

#[cfg(target_os = "linux")]
pub(crate) mod epoll;

#[cfg(target_os = "linux")]
pub(crate) use epoll as platform;

#[cfg(target_os = "macos")]
pub(crate) mod kqueue;

#[cfg(target_os = "macos")]
pub(crate) use kqueue as platform;

mod unix;

pub use unix::set_nonblocking;

/// Error returned by a failed register or unregister operation.
///
/// The errno is captured at the syscall boundary. For `kevent64` it is
/// either the process-level errno or the per-change `EV_ERROR` payload.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    /// `epoll_ctl` failed to add, modify or delete a registration.
    #[error("epoll_ctl failed (errno {errno})")]
    EpollCtl {
        /// Raw OS errno.
        errno: i32,
    },

    /// `kevent64` failed.
    #[error("kevent64 failed (errno {errno})")]
    KEvent {
        /// Raw OS errno.
        errno: i32,
    },
}
