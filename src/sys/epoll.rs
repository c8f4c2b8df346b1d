//! Linux `epoll` binding.
//!
//! Pure translation layer: registration changes become `epoll_ctl`
//! calls, waits become `epoll_wait`. The tagged record pointer rides in
//! `epoll_data.u64`. Linux has no auxiliary per-event slot, so no
//! generation number round-trips through the kernel here.

use super::unix::errno;
use super::PollError;

use libc::{epoll_create1, epoll_ctl, epoll_event, epoll_wait, EPOLL_CLOEXEC, EPOLL_CTL_DEL};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

pub(crate) type SysEvent = epoll_event;

/// Creates the multiplexer descriptor.
pub(crate) fn create() -> io::Result<RawFd> {
    let fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(fd)
}

/// Adds or modifies a registration. `events` is the raw epoll mask and
/// `data` round-trips through the kernel untouched.
pub(crate) fn ctl(epoll_fd: RawFd, op: i32, fd: RawFd, events: u32, data: u64) -> Result<(), PollError> {
    let mut event = epoll_event { events, u64: data };

    let rc = unsafe { epoll_ctl(epoll_fd, op, fd, &mut event) };
    if rc != 0 {
        return Err(PollError::EpollCtl { errno: errno() });
    }

    Ok(())
}

/// Removes a registration.
pub(crate) fn del(epoll_fd: RawFd, fd: RawFd) -> Result<(), PollError> {
    let rc = unsafe { epoll_ctl(epoll_fd, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(PollError::EpollCtl { errno: errno() });
    }

    Ok(())
}

/// Waits for readiness events. An interrupted wait reports zero events
/// rather than an error.
pub(crate) fn wait(epoll_fd: RawFd, events: &mut Vec<SysEvent>, timeout: Option<Duration>) -> io::Result<usize> {
    let timeout_ms = timeout.map(|t| t.as_millis() as i32).unwrap_or(-1);

    unsafe {
        events.set_len(0);
    }

    let n = unsafe {
        epoll_wait(
            epoll_fd,
            events.as_mut_ptr(),
            events.capacity() as i32,
            timeout_ms,
        )
    };

    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(err);
    }

    unsafe {
        events.set_len(n as usize);
    }

    Ok(n as usize)
}
