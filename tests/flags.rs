use fdpoll::PollFlags;

#[cfg(target_os = "linux")]
#[test]
fn epoll_events_translate_to_readiness_bits() {
    let readable = PollFlags::from_epoll_event(libc::EPOLLIN as u32);
    assert_eq!(readable, PollFlags::READABLE);

    let writable = PollFlags::from_epoll_event(libc::EPOLLOUT as u32);
    assert_eq!(writable, PollFlags::WRITABLE);

    let error = PollFlags::from_epoll_event(libc::EPOLLERR as u32);
    assert_eq!(error, PollFlags::EOF);

    let hangup = PollFlags::from_epoll_event(libc::EPOLLHUP as u32);
    assert_eq!(hangup, PollFlags::HUP);

    let combined = PollFlags::from_epoll_event((libc::EPOLLIN | libc::EPOLLHUP) as u32);
    assert_eq!(combined, PollFlags::READABLE | PollFlags::HUP);
}

#[test]
fn update_clears_only_readiness_bits() {
    let mut flags = PollFlags::POLL_READABLE
        | PollFlags::ONE_SHOT
        | PollFlags::FIFO
        | PollFlags::READABLE
        | PollFlags::HUP;

    flags.update(PollFlags::WRITABLE);

    assert!(flags.contains(PollFlags::WRITABLE));
    assert!(!flags.contains(PollFlags::READABLE), "stale readiness must be cleared");
    assert!(!flags.contains(PollFlags::HUP), "stale readiness must be cleared");
    assert!(flags.contains(PollFlags::POLL_READABLE), "asked-for bits must survive");
    assert!(flags.contains(PollFlags::ONE_SHOT), "lifecycle bits must survive");
    assert!(flags.contains(PollFlags::FIFO), "descriptor-kind bits must survive");
}

#[test]
fn update_is_idempotent() {
    let mut flags = PollFlags::POLL_WRITABLE | PollFlags::KEEPS_EVENT_LOOP_ALIVE;

    let event = PollFlags::WRITABLE | PollFlags::HUP;
    flags.update(event);
    let once = flags;

    flags.update(event);
    assert_eq!(flags, once, "applying the same event twice must not change the set");
}

#[test]
fn masks_are_disjoint() {
    assert!(
        (PollFlags::WATCH_MASK & PollFlags::READY_MASK).is_empty(),
        "asked-for and reported bits must not overlap"
    );

    let lifecycle = PollFlags::ONE_SHOT
        | PollFlags::NEEDS_REARM
        | PollFlags::HAS_INCREMENTED_POLL_COUNT
        | PollFlags::HAS_INCREMENTED_ACTIVE_COUNT
        | PollFlags::CLOSED
        | PollFlags::KEEPS_EVENT_LOOP_ALIVE
        | PollFlags::NONBLOCKING
        | PollFlags::WAS_EVER_REGISTERED
        | PollFlags::IGNORE_UPDATES;

    assert!((lifecycle & PollFlags::WATCH_MASK).is_empty());
    assert!((lifecycle & PollFlags::READY_MASK).is_empty());
}
