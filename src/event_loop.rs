//! Host event-loop handle and the seam runtimes implement to expose it.
//!
//! [`Loop`] owns the kernel multiplexer descriptor and the counters
//! that records adjust: `num_polls` (how many descriptors are tracked
//! at all) and the active count (how many of them should prevent the
//! process from exiting). The two axes move independently.
//!
//! [`LoopContext`] abstracts over the host loops that can allocate poll
//! records (the runtime's main loop and the auxiliary mini loop) so
//! the record and store code never name a concrete host.

use crate::dispatch;
use crate::store::PollStore;
use crate::sys::platform;

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Capacity of the ready-event buffer walked each tick.
const READY_CAPACITY: usize = 1024;

/// Reserved userdata for the internal waker.
///
/// Must never collide with a tagged record pointer; the all-ones value
/// decodes to no valid tag.
const WAKE_TOKEN: u64 = u64::MAX;

/// Ident of the user-event waker filter.
#[cfg(target_os = "macos")]
const WAKE_IDENT: u64 = u64::MAX;

/// Single-slot end-of-tick hook.
#[derive(Clone, Copy)]
pub(crate) struct AfterTick {
    pub(crate) callback: unsafe fn(*mut ()),
    pub(crate) data: *mut (),
}

/// Which host loop allocated a record, so teardown returns it to the
/// right pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventLoopKind {
    /// The runtime's main event loop.
    #[default]
    Main,

    /// The auxiliary mini loop.
    Mini,
}

/// Seam implemented by every host loop that hands out poll records.
pub trait LoopContext {
    /// Which host loop this context fronts.
    fn kind(&self) -> EventLoopKind;

    /// The platform event loop.
    fn event_loop(&mut self) -> &mut Loop;

    /// The record store and the loop, split-borrowed, so teardown can
    /// unregister and release in one pass.
    fn file_polls_and_loop(&mut self) -> (&mut PollStore, &mut Loop);

    /// The record store.
    fn file_polls(&mut self) -> &mut PollStore {
        self.file_polls_and_loop().0
    }
}

/// Handle to the kernel multiplexer plus the liveness counters records
/// adjust.
pub struct Loop {
    /// Multiplexer descriptor (`epoll_create1` / `kqueue`).
    fd: RawFd,

    /// Number of records currently registered. Accounting only; the
    /// loop never branches on it.
    pub num_polls: i32,

    /// Keep-alive count. The loop may idle or exit when it is zero.
    active: AtomicI64,

    /// Unrefs deferred to the next tick boundary.
    pending_unref: AtomicI64,

    /// Ready events delivered by the last kernel wait.
    ready_polls: Vec<platform::SysEvent>,

    /// Number of events in `ready_polls` this iteration.
    num_ready_polls: usize,

    /// Index of the event currently being dispatched.
    pub(crate) current_ready_poll: usize,

    /// Hook run once after the dispatch walk of each tick.
    pub(crate) after_tick: Option<AfterTick>,

    /// Eventfd used to interrupt a blocking wait.
    #[cfg(target_os = "linux")]
    wake_fd: RawFd,
}

// The cross-thread surface is limited to the atomic counters and
// `wake`; everything else is loop-thread only.
unsafe impl Send for Loop {}
unsafe impl Sync for Loop {}

impl Loop {
    /// Creates the multiplexer and its internal waker.
    pub fn new() -> io::Result<Loop> {
        let fd = platform::create()?;

        #[cfg(target_os = "linux")]
        let wake_fd = match Self::setup_waker(fd) {
            Ok(wake_fd) => wake_fd,
            Err(err) => {
                unsafe { libc::close(fd) };
                return Err(err);
            }
        };

        #[cfg(target_os = "macos")]
        if let Err(err) = Self::setup_waker(fd) {
            unsafe { libc::close(fd) };
            return Err(err);
        }

        Ok(Loop {
            fd,
            num_polls: 0,
            active: AtomicI64::new(0),
            pending_unref: AtomicI64::new(0),
            ready_polls: Vec::with_capacity(READY_CAPACITY),
            num_ready_polls: 0,
            current_ready_poll: 0,
            after_tick: None,
            #[cfg(target_os = "linux")]
            wake_fd,
        })
    }

    #[cfg(target_os = "linux")]
    fn setup_waker(epoll_fd: RawFd) -> io::Result<RawFd> {
        let wake_fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if wake_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { libc::epoll_ctl(epoll_fd, libc::EPOLL_CTL_ADD, wake_fd, &mut event) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(wake_fd) };
            return Err(err);
        }

        Ok(wake_fd)
    }

    #[cfg(target_os = "macos")]
    fn setup_waker(kqueue_fd: RawFd) -> io::Result<()> {
        use crate::sys::PollError;

        let change = libc::kevent64_s {
            ident: WAKE_IDENT,
            filter: libc::EVFILT_USER,
            flags: libc::EV_ADD | libc::EV_CLEAR,
            fflags: 0,
            data: 0,
            udata: WAKE_TOKEN,
            ext: [0; 2],
        };

        crate::sys::kqueue::change(kqueue_fd, change).map_err(|err| match err {
            PollError::EpollCtl { errno } | PollError::KEvent { errno } => {
                io::Error::from_raw_os_error(errno)
            }
        })
    }

    /// The multiplexer's descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Current keep-alive count.
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Raises the keep-alive count by `n`.
    pub fn add_active(&self, n: i64) {
        self.active.fetch_add(n, Ordering::Relaxed);
    }

    /// Lowers the keep-alive count by `n`.
    pub fn sub_active(&self, n: i64) {
        self.active.fetch_sub(n, Ordering::Relaxed);
    }

    /// Raises the keep-alive count by one.
    pub fn ref_(&mut self) {
        self.add_active(1);
    }

    /// Lowers the keep-alive count by one.
    pub fn unref(&mut self) {
        self.sub_active(1);
    }

    /// Thread-safe variant of [`ref_`](Self::ref_).
    pub fn ref_concurrently(&self) {
        self.add_active(1);
    }

    /// Thread-safe variant of [`unref`](Self::unref).
    pub fn unref_concurrently(&self) {
        self.sub_active(1);
    }

    /// Queues `n` unrefs to be applied at the next tick boundary.
    pub(crate) fn defer_unref(&self, n: i64) {
        self.pending_unref.fetch_add(n, Ordering::Relaxed);
    }

    /// Interrupts a blocking wait from any thread.
    pub fn wake(&self) {
        #[cfg(target_os = "linux")]
        {
            let buf: u64 = 1;
            unsafe { libc::write(self.wake_fd, &buf as *const u64 as *const _, 8) };
        }

        #[cfg(target_os = "macos")]
        {
            let change = libc::kevent64_s {
                ident: WAKE_IDENT,
                filter: libc::EVFILT_USER,
                flags: 0,
                fflags: libc::NOTE_TRIGGER,
                data: 0,
                udata: WAKE_TOKEN,
                ext: [0; 2],
            };
            let _ = crate::sys::kqueue::change(self.fd, change);
        }
    }

    /// Waits for readiness events, filling the ready array.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.num_ready_polls = 0;
        self.current_ready_poll = 0;

        let n = platform::wait(self.fd, &mut self.ready_polls, timeout)?;
        self.num_ready_polls = n;

        // Drain the waker so a level-triggered eventfd does not spin.
        #[cfg(target_os = "linux")]
        for i in 0..n {
            if self.ready_polls[i].u64 == WAKE_TOKEN {
                let mut buf = 0u64;
                unsafe { libc::read(self.wake_fd, &mut buf as *mut u64 as *mut _, 8) };
            }
        }

        Ok(n)
    }

    /// Number of events delivered by the last wait.
    pub fn num_ready_polls(&self) -> usize {
        self.num_ready_polls
    }

    /// The ready event at `index` from the last wait.
    pub(crate) fn ready_event(&self, index: usize) -> platform::SysEvent {
        self.ready_polls[index]
    }

    /// Userdata of the ready event at `index`.
    pub(crate) fn ready_userdata(&self, index: usize) -> u64 {
        #[cfg(target_os = "linux")]
        return self.ready_polls[index].u64;

        #[cfg(target_os = "macos")]
        return self.ready_polls[index].udata;
    }

    /// Applies unrefs deferred with [`defer_unref`](Self::defer_unref).
    pub(crate) fn drain_pending_unref(&mut self) {
        let n = self.pending_unref.swap(0, Ordering::Relaxed);
        if n != 0 {
            self.sub_active(n);
        }
    }
}

impl Drop for Loop {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        unsafe {
            libc::close(self.wake_fd);
        }

        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Runs one iteration of the host loop.
///
/// Waits for events, walks the ready array dispatching each event
/// through the exported entry point, runs the after-tick hook, then
/// applies deferred unrefs. Returns the number of kernel events
/// delivered.
pub fn tick(ctx: &mut dyn LoopContext, timeout: Option<Duration>) -> io::Result<usize> {
    let event_loop: *mut Loop = ctx.event_loop();

    // Owner callbacks may re-enter the loop (rearming, deinit); from
    // here on all access goes through the raw pointer.
    let n = unsafe { (*event_loop).wait(timeout)? };

    for index in 0..n {
        unsafe {
            (*event_loop).current_ready_poll = index;
        }
        let tagged = unsafe { (*event_loop).ready_userdata(index) };
        unsafe { dispatch::fdpoll__internal_dispatch_ready_poll(event_loop, tagged) };
    }

    let hook = unsafe { (*event_loop).after_tick.take() };
    if let Some(hook) = hook {
        unsafe { (hook.callback)(hook.data) };
    }

    unsafe {
        (*event_loop).drain_pending_unref();
    }

    Ok(n)
}
