//! The C-callable entry point the host loop invokes per ready record.
//!
//! The kernel hands back the userdata stored at registration time: a
//! record address with a small tag packed into its alignment bits.
//! Decoding is defensive on purpose: records are recycled from a free
//! list, so a stale event must be recognized and dropped, never
//! forwarded to whatever now occupies the memory.

use crate::event_loop::Loop;
use crate::flags::PollFlags;
use crate::record::FilePoll;

use log::debug;
use std::ptr::NonNull;

/// Discriminator carried in the alignment bits of kernel userdata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollTag {
    /// A [`FilePoll`] record.
    FilePoll = 1,
}

/// Low pointer bits available for the tag; records are at least
/// 8-byte aligned.
const TAG_MASK: u64 = 0b111;

/// A record pointer with a [`PollTag`] packed into its alignment bits.
///
/// This is the value that round-trips through `epoll_data.u64` /
/// `kevent64_s.udata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedPtr {
    value: u64,
}

impl TaggedPtr {
    /// Packs `ptr` and `tag` together.
    pub fn new(ptr: *mut FilePoll, tag: PollTag) -> TaggedPtr {
        let addr = ptr as u64;
        debug_assert_eq!(addr & TAG_MASK, 0, "record pointer is underaligned");

        TaggedPtr {
            value: addr | tag as u64,
        }
    }

    /// The raw userdata value.
    pub fn encode(self) -> u64 {
        self.value
    }

    /// Splits a userdata value back into an address and a recognized
    /// tag, if any.
    pub fn decode(value: u64) -> (u64, Option<PollTag>) {
        let tag = match value & TAG_MASK {
            1 => Some(PollTag::FilePoll),
            _ => None,
        };

        (value & !TAG_MASK, tag)
    }
}

/// Dispatches the ready event currently indexed by the loop's
/// `current_ready_poll` to the record encoded in `tagged`.
///
/// Exported under a stable C symbol so the host loop's vtable can carry
/// it. Events whose tag is not a record, or whose record is quarantined
/// for deferred free, are dropped.
///
/// # Safety
///
/// `event_loop` must point at the live [`Loop`] whose wait produced the
/// event, and the call must happen on the loop thread.
#[no_mangle]
pub unsafe extern "C" fn fdpoll__internal_dispatch_ready_poll(event_loop: *mut Loop, tagged: u64) {
    let (addr, tag) = TaggedPtr::decode(tagged);
    if tag != Some(PollTag::FilePoll) {
        return;
    }

    let Some(mut record) = NonNull::new(addr as *mut FilePoll) else {
        return;
    };
    let record = record.as_mut();

    if record.flags().contains(PollFlags::IGNORE_UPDATES) {
        debug!("dropping readiness event for quarantined record");
        return;
    }

    // Copy the event out before dispatch; the owner may mutate the
    // loop's ready state by re-entering it.
    let index = (*event_loop).current_ready_poll;
    let event = (*event_loop).ready_event(index);

    #[cfg(target_os = "linux")]
    record.on_epoll_event(&event);

    #[cfg(target_os = "macos")]
    record.on_kqueue_event(&event);
}
