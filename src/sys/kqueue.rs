//! macOS `kqueue` binding.
//!
//! Registration changes are submitted through `kevent64` one at a time,
//! non-blocking, with errors posted into the event list instead of
//! failing the whole syscall. The tagged record pointer rides in
//! `udata`; the record's generation number rides in `ext[0]` and is
//! echoed back with every delivered event.

use super::unix::errno;
use super::PollError;

use libc::{kevent64, kevent64_s, kqueue, timespec, EINTR, EV_ERROR};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

pub(crate) type SysEvent = kevent64_s;

/// Errors are posted into the event list instead of failing the syscall.
pub(crate) const KEVENT_FLAG_ERROR_EVENTS: u32 = 0x000002;

/// Reused for every non-blocking change submission.
const ZERO_TIMESPEC: timespec = timespec {
    tv_sec: 0,
    tv_nsec: 0,
};

/// Creates the event-queue descriptor.
pub(crate) fn create() -> io::Result<RawFd> {
    let fd = unsafe { kqueue() };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(fd)
}

/// Submits a single change without blocking.
///
/// `EINTR` retries; a returned `EV_ERROR` entry with non-zero data is
/// decoded into the typed error.
pub(crate) fn change(kqueue_fd: RawFd, change: kevent64_s) -> Result<(), PollError> {
    let mut out: kevent64_s = unsafe { std::mem::zeroed() };

    loop {
        let rc = unsafe {
            kevent64(
                kqueue_fd,
                &change,
                1,
                &mut out,
                1,
                KEVENT_FLAG_ERROR_EVENTS,
                &ZERO_TIMESPEC,
            )
        };

        if rc < 0 {
            let err = errno();
            if err == EINTR {
                continue;
            }
            return Err(PollError::KEvent { errno: err });
        }

        if rc > 0 && out.flags & EV_ERROR != 0 && out.data != 0 {
            return Err(PollError::KEvent {
                errno: out.data as i32,
            });
        }

        return Ok(());
    }
}

/// Waits for readiness events. An interrupted wait reports zero events
/// rather than an error.
pub(crate) fn wait(kqueue_fd: RawFd, events: &mut Vec<SysEvent>, timeout: Option<Duration>) -> io::Result<usize> {
    let timespec = timeout.map(|t| timespec {
        tv_sec: t.as_secs() as i64,
        tv_nsec: t.subsec_nanos() as i64,
    });

    unsafe {
        events.set_len(0);
    }

    let n = unsafe {
        kevent64(
            kqueue_fd,
            ptr::null(),
            0,
            events.as_mut_ptr(),
            events.capacity() as i32,
            0,
            timespec
                .as_ref()
                .map(|t| t as *const timespec)
                .unwrap_or(ptr::null()),
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
