//! Per-record flag set.
//!
//! Each poll record carries one [`PollFlags`] value describing what the
//! kernel was asked to watch, what it reported back, what kind of
//! descriptor is being watched, and lifecycle bookkeeping bits.
//!
//! Readiness bits reported by the kernel are transient: every new
//! kernel event fully replaces them (see [`PollFlags::update`]), while
//! the asked-for and lifecycle bits persist across events.

use bitflags::bitflags;

bitflags! {
    /// State of a single poll record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PollFlags: u32 {
        // What we asked the kernel to watch.
        const POLL_READABLE = 1 << 0;
        const POLL_WRITABLE = 1 << 1;
        const POLL_PROCESS = 1 << 2;
        const POLL_MACHPORT = 1 << 3;

        // What the kernel told us.
        const READABLE = 1 << 4;
        const WRITABLE = 1 << 5;
        const PROCESS = 1 << 6;
        const EOF = 1 << 7;
        const HUP = 1 << 8;
        const MACHPORT = 1 << 9;

        // What kind of descriptor this is.
        const FIFO = 1 << 10;
        const TTY = 1 << 11;

        // Lifecycle.
        const ONE_SHOT = 1 << 12;
        const NEEDS_REARM = 1 << 13;
        const HAS_INCREMENTED_POLL_COUNT = 1 << 14;
        const HAS_INCREMENTED_ACTIVE_COUNT = 1 << 15;
        const CLOSED = 1 << 16;
        const KEEPS_EVENT_LOOP_ALIVE = 1 << 17;
        const NONBLOCKING = 1 << 18;
        const WAS_EVER_REGISTERED = 1 << 19;
        const IGNORE_UPDATES = 1 << 20;
    }
}

impl PollFlags {
    /// Bits describing what the kernel was asked to watch.
    pub const WATCH_MASK: PollFlags = PollFlags::POLL_READABLE
        .union(PollFlags::POLL_WRITABLE)
        .union(PollFlags::POLL_PROCESS)
        .union(PollFlags::POLL_MACHPORT);

    /// Transient readiness bits reported by the kernel.
    pub const READY_MASK: PollFlags = PollFlags::READABLE
        .union(PollFlags::WRITABLE)
        .union(PollFlags::PROCESS)
        .union(PollFlags::EOF)
        .union(PollFlags::HUP)
        .union(PollFlags::MACHPORT);

    /// Translates a raw epoll event mask into readiness bits.
    #[cfg(target_os = "linux")]
    pub fn from_epoll_event(events: u32) -> PollFlags {
        let mut flags = PollFlags::empty();

        if events & libc::EPOLLIN as u32 != 0 {
            flags.insert(PollFlags::READABLE);
        }
        if events & libc::EPOLLOUT as u32 != 0 {
            flags.insert(PollFlags::WRITABLE);
        }
        if events & libc::EPOLLERR as u32 != 0 {
            flags.insert(PollFlags::EOF);
        }
        if events & libc::EPOLLHUP as u32 != 0 {
            flags.insert(PollFlags::HUP);
        }

        flags
    }

    /// Translates a delivered kqueue event into readiness bits.
    ///
    /// `EV_EOF` on a read or write filter is reported as a hangup in
    /// addition to the readiness itself.
    #[cfg(target_os = "macos")]
    pub fn from_kevent(event: &libc::kevent64_s) -> PollFlags {
        let mut flags = PollFlags::empty();

        match event.filter {
            libc::EVFILT_READ => {
                flags.insert(PollFlags::READABLE);
                if event.flags & libc::EV_EOF != 0 {
                    flags.insert(PollFlags::HUP);
                }
            }
            libc::EVFILT_WRITE => {
                flags.insert(PollFlags::WRITABLE);
                if event.flags & libc::EV_EOF != 0 {
                    flags.insert(PollFlags::HUP);
                }
            }
            libc::EVFILT_PROC => {
                flags.insert(PollFlags::PROCESS);
            }
            libc::EVFILT_MACHPORT => {
                flags.insert(PollFlags::MACHPORT);
            }
            _ => {}
        }

        flags
    }

    /// Merges a freshly translated readiness set into this one.
    ///
    /// All previous readiness bits are cleared first; asked-for and
    /// lifecycle bits are preserved. Applying the same translated event
    /// twice in a row is idempotent.
    pub fn update(&mut self, new: PollFlags) {
        *self = self.difference(PollFlags::READY_MASK).union(new);
    }
}

/// The single readiness class a registration asks the kernel to watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
    /// Data available to read.
    Readable,

    /// Room to write.
    Writable,

    /// Process exit. On Linux the descriptor is expected to be a pidfd
    /// and the watch is expressed as readability; on macOS it is an
    /// `EVFILT_PROC` filter with `NOTE_EXIT`.
    Process,

    /// Mach-port message arrival.
    #[cfg(target_os = "macos")]
    Machport,
}
