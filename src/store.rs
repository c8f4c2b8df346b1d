//! Recycling pool for poll records with deferred destruction.
//!
//! Records are handed out from a fixed-capacity free list (the hive)
//! and returned through a quarantine: a record that was ever exposed to
//! the kernel may still be named by an event sitting in the loop's
//! ready array, so it is parked on a pending-free queue and only
//! reclaimed by the after-tick callback, once the ready array has been
//! fully drained. Until then its `ignore_updates` bit guarantees no
//! dispatch reaches it.

use crate::event_loop::{AfterTick, Loop};
use crate::record::FilePoll;

use log::trace;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

/// Default number of records kept in the hive.
const DEFAULT_CAPACITY: usize = 128;

/// Fixed-capacity pool of record slots with an index free list.
///
/// Slots never move, so a record keeps its address for as long as it is
/// live; the kernel holds tagged pointers to these addresses.
struct Hive {
    slots: Box<[MaybeUninit<FilePoll>]>,
    free: Vec<u32>,
}

impl Hive {
    fn new(capacity: usize) -> Hive {
        let slots = (0..capacity).map(|_| MaybeUninit::uninit()).collect();
        let free = (0..capacity as u32).rev().collect();

        Hive { slots, free }
    }

    fn get(&mut self) -> Option<NonNull<FilePoll>> {
        let index = self.free.pop()? as usize;
        self.slots[index].write(FilePoll::unbound());

        Some(unsafe { NonNull::new_unchecked(self.slots[index].as_mut_ptr()) })
    }

    /// Returns the record's slot to the free list. False when the
    /// record is not hive-backed.
    fn put(&mut self, record: NonNull<FilePoll>) -> bool {
        let base = self.slots.as_ptr() as usize;
        let end = base + self.slots.len() * std::mem::size_of::<FilePoll>();
        let addr = record.as_ptr() as usize;

        if addr < base || addr >= end {
            return false;
        }

        let index = (addr - base) / std::mem::size_of::<FilePoll>();
        self.free.push(index as u32);

        true
    }
}

/// Free-list-backed pool of poll records with a deferred-free queue
/// drained after each event-loop tick.
pub struct PollStore {
    hive: Hive,

    /// Head of the pending-free FIFO (oldest first).
    pending_head: *mut FilePoll,

    /// Tail of the pending-free FIFO.
    pending_tail: *mut FilePoll,
}

impl PollStore {
    /// A store with the default hive capacity.
    pub fn new() -> PollStore {
        PollStore::with_capacity(DEFAULT_CAPACITY)
    }

    /// A store holding `capacity` records before falling back to the
    /// general allocator.
    pub fn with_capacity(capacity: usize) -> PollStore {
        PollStore {
            hive: Hive::new(capacity),
            pending_head: ptr::null_mut(),
            pending_tail: ptr::null_mut(),
        }
    }

    /// Hands out an unbound record, reusing a hive slot when one is
    /// free.
    pub fn acquire(&mut self) -> NonNull<FilePoll> {
        if let Some(record) = self.hive.get() {
            return record;
        }

        NonNull::from(Box::leak(Box::new(FilePoll::unbound())))
    }

    /// Returns a record to the pool.
    ///
    /// A record that was never exposed to the kernel goes straight back
    /// to the hive. Otherwise it is quarantined on the pending-free
    /// queue until the end of the current tick, because a ready event
    /// naming it may still be queued for dispatch.
    ///
    /// The store must stay at a stable address until the armed
    /// after-tick callback has run.
    pub fn release(&mut self, event_loop: &mut Loop, mut record: NonNull<FilePoll>, ever_registered: bool) {
        if !ever_registered {
            self.reclaim(record);
            return;
        }

        unsafe {
            let poll = record.as_mut();
            poll.quarantine();
            poll.next_to_free = ptr::null_mut();

            if self.pending_tail.is_null() {
                self.pending_head = record.as_ptr();
            } else {
                (*self.pending_tail).next_to_free = record.as_ptr();
            }
            self.pending_tail = record.as_ptr();
        }

        // One store per loop: the slot must be empty or already ours.
        let hook = AfterTick {
            callback: PollStore::process_deferred_frees_callback,
            data: self as *mut PollStore as *mut (),
        };
        match &event_loop.after_tick {
            None => event_loop.after_tick = Some(hook),
            Some(existing) => {
                assert!(
                    existing.callback == hook.callback && existing.data == hook.data,
                    "after-tick slot already claimed by another hook"
                );
            }
        }
    }

    /// Drains the pending-free queue, returning every record to the
    /// hive. Idempotent.
    pub fn process_deferred_frees(&mut self) {
        let mut cursor = self.pending_head;
        self.pending_head = ptr::null_mut();
        self.pending_tail = ptr::null_mut();

        while !cursor.is_null() {
            let record = unsafe { NonNull::new_unchecked(cursor) };
            unsafe {
                cursor = (*record.as_ptr()).next_to_free;
                (*record.as_ptr()).next_to_free = ptr::null_mut();
            }
            self.reclaim(record);
        }
    }

    /// Number of records currently quarantined for deferred free.
    pub fn pending_free_len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.pending_head;
        while !cursor.is_null() {
            count += 1;
            cursor = unsafe { (*cursor).next_to_free };
        }

        count
    }

    fn reclaim(&mut self, record: NonNull<FilePoll>) {
        trace!("reclaiming poll record at {:p}", record.as_ptr());

        if !self.hive.put(record) {
            // Overflow record from the general allocator.
            drop(unsafe { Box::from_raw(record.as_ptr()) });
        }
    }

    unsafe fn process_deferred_frees_callback(data: *mut ()) {
        (*(data as *mut PollStore)).process_deferred_frees();
    }
}

impl Default for PollStore {
    fn default() -> PollStore {
        PollStore::new()
    }
}

impl Drop for PollStore {
    /// Any records still quarantined go back to the pool so overflow
    /// allocations are not leaked.
    fn drop(&mut self) {
        self.process_deferred_frees();
    }
}
