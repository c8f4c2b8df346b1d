//! The per-descriptor registration record.
//!
//! A [`FilePoll`] binds one file descriptor to one owning object and
//! tracks the full registration lifecycle: what the kernel was asked to
//! watch, whether a one-shot registration has fired and needs rearming,
//! and how this record participates in the loop's poll and keep-alive
//! counters.
//!
//! Records are acquired from a [`PollStore`](crate::store::PollStore)
//! and handed back through [`deinit`](FilePoll::deinit); they are
//! recycled, so no pointer to a record may be kept past its deinit.

use crate::dispatch::{PollTag, TaggedPtr};
use crate::event_loop::{EventLoopKind, Loop, LoopContext};
use crate::flags::{PollFlags, Watch};
use crate::owner::Owner;
use crate::sys::platform;
use crate::sys::PollError;

use log::{debug, trace};
use std::os::unix::io::RawFd;
use std::ptr::{self, NonNull};

#[cfg(target_os = "macos")]
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel meaning "not bound to any descriptor".
pub const INVALID_FD: RawFd = -1;

/// Process-wide generation counter for kqueue registrations.
#[cfg(target_os = "macos")]
static MAX_GENERATION: AtomicU64 = AtomicU64::new(0);

#[cfg(target_os = "macos")]
fn next_generation() -> u64 {
    MAX_GENERATION.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// A single per-descriptor poll registration.
pub struct FilePoll {
    fd: RawFd,
    flags: PollFlags,
    owner: Owner,

    /// Echoed back by the kernel in `ext[0]`; detects events delivered
    /// against a recycled record.
    #[cfg(target_os = "macos")]
    generation: u64,

    /// Intrusive link, used only while queued for deferred destruction.
    pub(crate) next_to_free: *mut FilePoll,

    event_loop_kind: EventLoopKind,
}

impl FilePoll {
    /// A blank record, not bound to any descriptor or owner.
    pub(crate) fn unbound() -> FilePoll {
        FilePoll {
            fd: INVALID_FD,
            flags: PollFlags::empty(),
            owner: Owner::Deactivated,
            #[cfg(target_os = "macos")]
            generation: 0,
            next_to_free: ptr::null_mut(),
            event_loop_kind: EventLoopKind::default(),
        }
    }

    /// Acquires a record from the context's store and binds it to `fd`
    /// and `owner`.
    ///
    /// The returned pointer stays valid until the record is passed to
    /// [`deinit`](Self::deinit).
    pub fn init(ctx: &mut dyn LoopContext, fd: RawFd, flags: PollFlags, owner: Owner) -> NonNull<FilePoll> {
        let kind = ctx.kind();
        let mut record = ctx.file_polls().acquire();

        let poll = unsafe { record.as_mut() };
        poll.fd = fd;
        poll.flags = flags;
        poll.owner = owner;
        poll.event_loop_kind = kind;

        record
    }

    /// The bound descriptor, or [`INVALID_FD`].
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The current flag set.
    pub fn flags(&self) -> PollFlags {
        self.flags
    }

    /// The owning object's tag.
    pub fn owner_kind(&self) -> crate::owner::OwnerKind {
        self.owner.kind()
    }

    /// Which host loop allocated this record.
    pub fn event_loop_kind(&self) -> EventLoopKind {
        self.event_loop_kind
    }

    /// True iff the record is bound to a descriptor.
    pub fn is_live(&self) -> bool {
        self.fd != INVALID_FD
    }

    /// True iff a watch has been asked of the kernel and not yet
    /// unregistered.
    pub fn is_watching(&self) -> bool {
        self.flags.intersects(PollFlags::WATCH_MASK)
    }

    /// True iff this record currently counts toward the loop's poll
    /// count.
    pub fn is_active(&self) -> bool {
        self.flags.contains(PollFlags::HAS_INCREMENTED_POLL_COUNT)
    }

    /// True iff the kernel reported the descriptor readable.
    pub fn is_readable(&self) -> bool {
        self.flags.contains(PollFlags::READABLE)
    }

    /// True iff the kernel reported the descriptor writable.
    pub fn is_writable(&self) -> bool {
        self.flags.contains(PollFlags::WRITABLE)
    }

    /// True iff the kernel reported a peer hangup.
    pub fn is_hup(&self) -> bool {
        self.flags.contains(PollFlags::HUP)
    }

    /// True iff the kernel reported end-of-file or a descriptor error.
    pub fn is_eof(&self) -> bool {
        self.flags.contains(PollFlags::EOF)
    }

    /// True iff the descriptor has been marked closed.
    pub fn is_closed(&self) -> bool {
        self.flags.contains(PollFlags::CLOSED)
    }

    /// True iff this record may keep the event loop alive.
    pub fn can_ref(&self) -> bool {
        !self.is_closed()
    }

    /// Marks the descriptor closed; a closed record can no longer keep
    /// the loop alive.
    pub fn set_closed(&mut self) {
        self.flags.insert(PollFlags::CLOSED);
    }

    /// Counts this record into the loop's poll count, and into the
    /// active count when it keeps the loop alive. Idempotent.
    fn activate(&mut self, event_loop: &mut Loop) {
        if !self.flags.contains(PollFlags::HAS_INCREMENTED_POLL_COUNT) {
            event_loop.num_polls += 1;
            self.flags.insert(PollFlags::HAS_INCREMENTED_POLL_COUNT);
        }

        if self.flags.contains(PollFlags::KEEPS_EVENT_LOOP_ALIVE)
            && !self.flags.contains(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT)
        {
            event_loop.add_active(1);
            self.flags.insert(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT);
        }
    }

    /// Counts this record out of the loop's poll and active counts.
    /// Idempotent.
    fn deactivate(&mut self, event_loop: &mut Loop) {
        if self.flags.contains(PollFlags::HAS_INCREMENTED_POLL_COUNT) {
            event_loop.num_polls -= 1;
            self.flags.remove(PollFlags::HAS_INCREMENTED_POLL_COUNT);
        }

        if self.flags.contains(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT) {
            event_loop.sub_active(1);
            self.flags.remove(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT);
        }
    }

    /// Makes a registered record hold the loop open. No-op on a closed
    /// record.
    pub fn enable_keep_alive(&mut self, event_loop: &mut Loop) {
        if !self.can_ref() || self.flags.contains(PollFlags::KEEPS_EVENT_LOOP_ALIVE) {
            return;
        }

        self.flags.insert(PollFlags::KEEPS_EVENT_LOOP_ALIVE);

        if self.flags.contains(PollFlags::HAS_INCREMENTED_POLL_COUNT)
            && !self.flags.contains(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT)
        {
            event_loop.add_active(1);
            self.flags.insert(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT);
        }
    }

    /// Stops this record from holding the loop open. The registration
    /// itself is untouched.
    pub fn disable_keep_alive(&mut self, event_loop: &mut Loop) {
        self.flags.remove(PollFlags::KEEPS_EVENT_LOOP_ALIVE);

        if self.flags.contains(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT) {
            event_loop.sub_active(1);
            self.flags.remove(PollFlags::HAS_INCREMENTED_ACTIVE_COUNT);
        }
    }

    /// Asks the kernel to watch `watch` on this record's descriptor.
    ///
    /// Re-registering an already watched record refreshes the existing
    /// kernel entry instead of adding a duplicate. On failure the
    /// loop's counters are restored before the error is returned.
    pub fn register(&mut self, event_loop: &mut Loop, watch: Watch, one_shot: bool) -> Result<(), PollError> {
        debug_assert_ne!(self.fd, INVALID_FD, "register on an unbound record");

        if one_shot {
            self.flags.insert(PollFlags::ONE_SHOT);
        }

        let tagged = TaggedPtr::new(self as *mut FilePoll, PollTag::FilePoll).encode();

        #[cfg(target_os = "linux")]
        {
            use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLL_CTL_ADD, EPOLL_CTL_MOD};

            let mut events = match watch {
                Watch::Readable | Watch::Process => (EPOLLIN | EPOLLHUP) as u32,
                Watch::Writable => (EPOLLOUT | EPOLLHUP | EPOLLERR) as u32,
            };
            if self.flags.contains(PollFlags::ONE_SHOT) {
                events |= EPOLLONESHOT as u32;
            }

            // A fired one-shot is still present in the interest list,
            // merely disarmed, so it rearms with MOD like any live
            // registration.
            let op = if self.is_watching() || self.flags.contains(PollFlags::NEEDS_REARM) {
                EPOLL_CTL_MOD
            } else {
                EPOLL_CTL_ADD
            };

            self.flags.insert(PollFlags::WAS_EVER_REGISTERED);

            if let Err(err) = platform::ctl(event_loop.fd(), op, self.fd, events, tagged) {
                self.deactivate(event_loop);
                return Err(err);
            }
        }

        #[cfg(target_os = "macos")]
        {
            use libc::{EV_ADD, EV_ONESHOT, EVFILT_MACHPORT, EVFILT_PROC, EVFILT_READ, EVFILT_WRITE, NOTE_EXIT};

            let filter = match watch {
                Watch::Readable => EVFILT_READ,
                Watch::Writable => EVFILT_WRITE,
                Watch::Process => EVFILT_PROC,
                Watch::Machport => EVFILT_MACHPORT,
            };

            let mut kflags = EV_ADD;
            if self.flags.contains(PollFlags::ONE_SHOT) {
                kflags |= EV_ONESHOT;
            }

            self.generation = next_generation();

            let change = libc::kevent64_s {
                ident: self.fd as u64,
                filter,
                flags: kflags,
                fflags: if matches!(watch, Watch::Process) { NOTE_EXIT } else { 0 },
                data: 0,
                udata: tagged,
                ext: [self.generation, 0],
            };

            self.flags.insert(PollFlags::WAS_EVER_REGISTERED);

            if let Err(err) = platform::change(event_loop.fd(), change) {
                self.deactivate(event_loop);
                return Err(err);
            }
        }

        self.activate(event_loop);

        self.flags.remove(PollFlags::WATCH_MASK);
        let watched = match watch {
            Watch::Readable => PollFlags::POLL_READABLE,
            Watch::Writable => PollFlags::POLL_WRITABLE,
            // pidfd readability stands in for exit on Linux.
            #[cfg(target_os = "linux")]
            Watch::Process => PollFlags::POLL_READABLE,
            #[cfg(target_os = "macos")]
            Watch::Process => PollFlags::POLL_PROCESS,
            #[cfg(target_os = "macos")]
            Watch::Machport => PollFlags::POLL_MACHPORT,
        };
        self.flags.insert(watched);
        self.flags.remove(PollFlags::NEEDS_REARM);

        trace!("registered fd={} watch={:?} one_shot={}", self.fd, watch, one_shot);

        Ok(())
    }

    /// Withdraws the kernel registration.
    ///
    /// A fired one-shot has already been forgotten by the kernel on the
    /// event-queue backend; unless `force_unregister` is set, no
    /// syscall is issued for it. In every non-no-op path the loop's
    /// poll count drops by one, the active count by one if held, and
    /// every watched bit is cleared.
    pub fn unregister(&mut self, event_loop: &mut Loop, force_unregister: bool) -> Result<(), PollError> {
        if !self.flags.intersects(PollFlags::WATCH_MASK) {
            return Ok(());
        }

        let result = if self.flags.contains(PollFlags::NEEDS_REARM) && !force_unregister {
            // The one-shot fired; nothing left to delete.
            Ok(())
        } else {
            #[cfg(target_os = "linux")]
            {
                platform::del(event_loop.fd(), self.fd)
            }

            #[cfg(target_os = "macos")]
            {
                use libc::{EV_DELETE, EVFILT_MACHPORT, EVFILT_PROC, EVFILT_READ, EVFILT_WRITE};

                let filter = if self.flags.contains(PollFlags::POLL_READABLE) {
                    EVFILT_READ
                } else if self.flags.contains(PollFlags::POLL_WRITABLE) {
                    EVFILT_WRITE
                } else if self.flags.contains(PollFlags::POLL_PROCESS) {
                    EVFILT_PROC
                } else {
                    EVFILT_MACHPORT
                };

                let change = libc::kevent64_s {
                    ident: self.fd as u64,
                    filter,
                    flags: EV_DELETE,
                    fflags: 0,
                    data: 0,
                    udata: 0,
                    ext: [0; 2],
                };

                platform::change(event_loop.fd(), change)
            }
        };

        self.deactivate(event_loop);
        self.flags.remove(PollFlags::WATCH_MASK | PollFlags::ONE_SHOT | PollFlags::NEEDS_REARM);

        trace!("unregistered fd={} force={}", self.fd, force_unregister);

        result
    }

    /// Merges kernel-reported readiness into the flag set, clearing the
    /// previous readiness first.
    pub fn update_flags(&mut self, new: PollFlags) {
        self.flags.update(new);
    }

    /// Forwards a readiness event to the owner.
    ///
    /// `size_or_offset` is the kernel's best-effort byte count (0 when
    /// the platform cannot supply one). A fired one-shot is marked as
    /// needing rearm before the owner runs, so the owner can re-register
    /// from inside its callback.
    pub fn on_update(&mut self, size_or_offset: i64) {
        if self.flags.contains(PollFlags::ONE_SHOT) && !self.flags.contains(PollFlags::NEEDS_REARM) {
            self.flags.insert(PollFlags::NEEDS_REARM);
        }

        let hup = self.flags.contains(PollFlags::HUP);

        // The owner may re-enter and deinit this record; dispatch from
        // a copy of the tag.
        let owner = self.owner;
        match owner {
            Owner::FifoReader(mut target) | Owner::PipeReader(mut target) => unsafe {
                target.as_mut().ready(size_or_offset, hup);
            },
            Owner::FileSink(mut target)
            | Owner::CapturedWriter(mut target)
            | Owner::ScriptOutputReader(mut target) => unsafe {
                target.as_mut().on_poll(size_or_offset);
            },
            Owner::Subprocess(mut target) | Owner::ShellSubprocess(mut target) => unsafe {
                target.as_mut().on_exit_notification();
            },
            Owner::DnsResolver(mut target) => unsafe {
                target.as_mut().on_dns_poll(self);
            },
            #[cfg(target_os = "macos")]
            Owner::MachportWatcher(mut target) => unsafe {
                target.as_mut().on_machport_change();
            },
            Owner::ScriptPidPoller(mut target) => unsafe {
                target.as_mut().on_process_update(size_or_offset);
            },
            Owner::Deactivated => {
                debug!("dropping readiness event for deactivated record (fd={})", self.fd);
            }
        }
    }

    /// Translates and dispatches one delivered epoll event.
    #[cfg(target_os = "linux")]
    pub(crate) fn on_epoll_event(&mut self, event: &platform::SysEvent) {
        let events = event.events;
        self.update_flags(PollFlags::from_epoll_event(events));

        // epoll cannot report a byte count.
        self.on_update(0);
    }

    /// Translates and dispatches one delivered kqueue event.
    #[cfg(target_os = "macos")]
    pub(crate) fn on_kqueue_event(&mut self, event: &platform::SysEvent) {
        debug_assert_eq!(
            self.generation, event.ext[0],
            "kqueue event delivered against a recycled record"
        );

        self.update_flags(PollFlags::from_kevent(event));
        self.on_update(event.data);
    }

    /// Stops any dispatch from reaching the owner. Set exactly from the
    /// moment the record enters the deferred-free queue until reuse.
    pub(crate) fn quarantine(&mut self) {
        self.flags.insert(PollFlags::IGNORE_UPDATES);
    }

    /// Tears the record down and hands it back for deferred reuse.
    ///
    /// Unregisters, severs the owner, and queues the record on the
    /// store's pending-free list. The record must not be touched after
    /// this call.
    pub fn deinit(&mut self, ctx: &mut dyn LoopContext) {
        self.deinit_inner(ctx, false);
    }

    /// Like [`deinit`](Self::deinit), but deletes the kernel
    /// registration even when a fired one-shot made the syscall
    /// skippable.
    pub fn deinit_force_unregister(&mut self, ctx: &mut dyn LoopContext) {
        self.deinit_inner(ctx, true);
    }

    fn deinit_inner(&mut self, ctx: &mut dyn LoopContext, force_unregister: bool) {
        debug_assert_eq!(
            self.event_loop_kind,
            ctx.kind(),
            "record deinitialized through the wrong host loop"
        );

        let (store, event_loop) = ctx.file_polls_and_loop();

        if let Err(err) = self.unregister(event_loop, force_unregister) {
            debug!("unregister during deinit failed (fd={}): {}", self.fd, err);
        }

        let ever_registered = self.flags.contains(PollFlags::WAS_EVER_REGISTERED);
        self.owner = Owner::Deactivated;
        self.flags = PollFlags::empty();
        self.fd = INVALID_FD;

        let record = NonNull::from(self);
        store.release(event_loop, record, ever_registered);
    }
}
