//! Owner identity for poll records.
//!
//! Every record belongs to exactly one owning object. The set of owner
//! kinds is closed and compiled in: readiness is never dispatched
//! through reflection or dynamic registration, only through the match
//! in the record's update path. Records are recycled from a pool, so a
//! reclaimed record's owner is reset to the [`Owner::Deactivated`]
//! sentinel and any event that still names it is dropped.
//!
//! The variants carry non-owning pointers. The pointee must outlive the
//! registration; tearing the owner down without deinitializing its
//! record first is a contract violation.

use crate::record::FilePoll;

use std::ptr::NonNull;

/// Readiness callback for pipe- and FIFO-style readers.
pub trait ReadReady {
    /// Called when the descriptor is readable. `size_or_offset` is a
    /// best-effort count of bytes available (0 when the platform cannot
    /// supply one); `hup` reports a peer hangup.
    fn ready(&mut self, size_or_offset: i64, hup: bool);
}

/// Readiness callback for sinks, captured writers, and other owners
/// notified with a plain byte-count poll.
pub trait WriteReady {
    /// Called when the descriptor is ready. `size_or_offset` is a
    /// best-effort count of bytes writable (0 when the platform cannot
    /// supply one).
    fn on_poll(&mut self, size_or_offset: i64);
}

/// Exit notification for subprocess watchers.
pub trait ProcessExit {
    /// Called once when the watched process has exited.
    fn on_exit_notification(&mut self);
}

/// Readiness callback for DNS resolvers. Receives the record itself so
/// the resolver can rearm or tear it down.
pub trait DnsReady {
    fn on_dns_poll(&mut self, poll: &mut FilePoll);
}

/// Mach-port change notification.
#[cfg(target_os = "macos")]
pub trait MachportReady {
    fn on_machport_change(&mut self);
}

/// Byte-count updates for watchers of a child process's pid data.
pub trait ProcessUpdate {
    fn on_process_update(&mut self, size_or_offset: i64);
}

/// Discriminant of an [`Owner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    FifoReader,
    PipeReader,
    FileSink,
    CapturedWriter,
    Subprocess,
    ShellSubprocess,
    DnsResolver,
    #[cfg(target_os = "macos")]
    MachportWatcher,
    ScriptOutputReader,
    ScriptPidPoller,
    Deactivated,
}

/// The tagged owner of a poll record.
///
/// One variant per owner kind, each carrying a pointer to that kind's
/// callback object, plus the [`Deactivated`](Owner::Deactivated)
/// sentinel for records awaiting reuse.
#[derive(Debug, Clone, Copy)]
pub enum Owner {
    FifoReader(NonNull<dyn ReadReady>),
    PipeReader(NonNull<dyn ReadReady>),
    FileSink(NonNull<dyn WriteReady>),
    CapturedWriter(NonNull<dyn WriteReady>),
    Subprocess(NonNull<dyn ProcessExit>),
    ShellSubprocess(NonNull<dyn ProcessExit>),
    DnsResolver(NonNull<dyn DnsReady>),
    #[cfg(target_os = "macos")]
    MachportWatcher(NonNull<dyn MachportReady>),
    ScriptOutputReader(NonNull<dyn WriteReady>),
    ScriptPidPoller(NonNull<dyn ProcessUpdate>),

    /// Sentinel owner of records that have been handed back for reuse.
    Deactivated,
}

impl Owner {
    /// The discriminant of this owner.
    pub fn kind(&self) -> OwnerKind {
        match self {
            Owner::FifoReader(_) => OwnerKind::FifoReader,
            Owner::PipeReader(_) => OwnerKind::PipeReader,
            Owner::FileSink(_) => OwnerKind::FileSink,
            Owner::CapturedWriter(_) => OwnerKind::CapturedWriter,
            Owner::Subprocess(_) => OwnerKind::Subprocess,
            Owner::ShellSubprocess(_) => OwnerKind::ShellSubprocess,
            Owner::DnsResolver(_) => OwnerKind::DnsResolver,
            #[cfg(target_os = "macos")]
            Owner::MachportWatcher(_) => OwnerKind::MachportWatcher,
            Owner::ScriptOutputReader(_) => OwnerKind::ScriptOutputReader,
            Owner::ScriptPidPoller(_) => OwnerKind::ScriptPidPoller,
            Owner::Deactivated => OwnerKind::Deactivated,
        }
    }

    /// Human-readable name of the owner kind, for diagnostics. `None`
    /// for the deactivated sentinel.
    pub fn type_name(&self) -> Option<&'static str> {
        match self.kind() {
            OwnerKind::FifoReader => Some("FifoReader"),
            OwnerKind::PipeReader => Some("PipeReader"),
            OwnerKind::FileSink => Some("FileSink"),
            OwnerKind::CapturedWriter => Some("CapturedWriter"),
            OwnerKind::Subprocess => Some("Subprocess"),
            OwnerKind::ShellSubprocess => Some("ShellSubprocess"),
            OwnerKind::DnsResolver => Some("DnsResolver"),
            #[cfg(target_os = "macos")]
            OwnerKind::MachportWatcher => Some("MachportWatcher"),
            OwnerKind::ScriptOutputReader => Some("ScriptOutputReader"),
            OwnerKind::ScriptPidPoller => Some("ScriptPidPoller"),
            OwnerKind::Deactivated => None,
        }
    }

    /// True iff this is the reuse sentinel.
    pub fn is_deactivated(&self) -> bool {
        matches!(self, Owner::Deactivated)
    }
}
