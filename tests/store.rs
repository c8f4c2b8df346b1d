mod common;

use common::{ReadProbe, TestCtx};
use fdpoll::owner::ReadReady;
use fdpoll::{FilePoll, LoopContext, Owner, OwnerKind, PollFlags, PollStore, INVALID_FD};

use std::ptr::NonNull;
use std::time::Duration;

#[test]
fn never_registered_records_return_straight_to_the_hive() {
    let mut ctx = TestCtx::new();

    let (mut probe, _log) = ReadProbe::new();
    let owner = Owner::PipeReader(NonNull::from(&mut *probe as &mut dyn ReadReady));

    let record = FilePoll::init(&mut ctx, 3, PollFlags::empty(), owner);
    let address = record.as_ptr();

    unsafe { &mut *address }.deinit(&mut ctx);

    assert_eq!(
        ctx.polls.pending_free_len(),
        0,
        "a record the kernel never saw needs no quarantine"
    );

    let reused = ctx.polls.acquire();
    assert_eq!(reused.as_ptr(), address, "the slot must be immediately reusable");
}

#[test]
fn hive_overflow_falls_back_to_the_allocator() {
    let mut store = PollStore::with_capacity(1);

    let first = store.acquire();
    let second = store.acquire();
    assert_ne!(first.as_ptr(), second.as_ptr());

    let mut event_loop = fdpoll::Loop::new().expect("create event loop");
    store.release(&mut event_loop, second, false);
    store.release(&mut event_loop, first, false);
}

#[test]
fn released_records_are_quarantined_until_the_after_tick_drain() {
    let mut ctx = TestCtx::new();

    let record = ctx.polls.acquire();
    let address = record.as_ptr();

    {
        let (store, event_loop) = ctx.file_polls_and_loop();
        store.release(event_loop, record, true);
    }

    assert_eq!(ctx.polls.pending_free_len(), 1);

    let quarantined = unsafe { &*address };
    assert!(
        quarantined.flags().contains(PollFlags::IGNORE_UPDATES),
        "queued records must refuse dispatch"
    );

    let other = ctx.polls.acquire();
    assert_ne!(
        other.as_ptr(),
        address,
        "a quarantined record must not be handed out"
    );

    ctx.polls.process_deferred_frees();
    assert_eq!(ctx.polls.pending_free_len(), 0);

    let reused = ctx.polls.acquire();
    assert_eq!(reused.as_ptr(), address, "the drain returns the record to the hive");
}

#[test]
fn deinit_queues_records_with_the_deactivated_owner() {
    let mut ctx = TestCtx::new();
    let (read_end, write_end) = common::pipe();

    let (mut probe, _log) = ReadProbe::new();
    let owner = Owner::FifoReader(NonNull::from(&mut *probe as &mut dyn ReadReady));

    let record = FilePoll::init(&mut ctx, read_end, PollFlags::FIFO, owner);
    let address = record.as_ptr();

    unsafe { &mut *address }
        .register(&mut ctx.event_loop, fdpoll::Watch::Readable, false)
        .expect("register");

    unsafe { &mut *address }.deinit(&mut ctx);

    let quarantined = unsafe { &*address };
    assert!(quarantined.flags().contains(PollFlags::IGNORE_UPDATES));
    assert_eq!(quarantined.owner_kind(), OwnerKind::Deactivated);
    assert_eq!(quarantined.fd(), INVALID_FD);
    assert_eq!(ctx.polls.pending_free_len(), 1);

    // The armed after-tick callback reclaims it.
    fdpoll::tick(&mut ctx, Some(Duration::from_millis(0))).expect("tick");
    assert_eq!(ctx.polls.pending_free_len(), 0);

    common::close_fd(read_end);
    common::close_fd(write_end);
}

#[test]
fn process_deferred_frees_is_idempotent() {
    let mut ctx = TestCtx::new();

    let record = ctx.polls.acquire();

    {
        let (store, event_loop) = ctx.file_polls_and_loop();
        store.release(event_loop, record, true);
    }

    ctx.polls.process_deferred_frees();
    ctx.polls.process_deferred_frees();
    assert_eq!(ctx.polls.pending_free_len(), 0);
}
