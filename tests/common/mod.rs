#![allow(dead_code)]

use fdpoll::owner::{ReadReady, WriteReady};
use fdpoll::{EventLoopKind, Loop, LoopContext, PollStore};

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::Rc;

/// A minimal host loop: one platform event loop plus one record store.
pub struct TestCtx {
    pub event_loop: Loop,
    pub polls: PollStore,
}

impl TestCtx {
    pub fn new() -> TestCtx {
        TestCtx {
            event_loop: Loop::new().expect("create event loop"),
            polls: PollStore::new(),
        }
    }
}

impl LoopContext for TestCtx {
    fn kind(&self) -> EventLoopKind {
        EventLoopKind::Main
    }

    fn event_loop(&mut self) -> &mut Loop {
        &mut self.event_loop
    }

    fn file_polls_and_loop(&mut self) -> (&mut PollStore, &mut Loop) {
        (&mut self.polls, &mut self.event_loop)
    }
}

pub fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe creation failed");

    (fds[0], fds[1])
}

pub fn close_fd(fd: RawFd) {
    unsafe { libc::close(fd) };
}

pub fn write_bytes(fd: RawFd, count: usize) {
    let buf = vec![0u8; count];
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const _, buf.len()) };
    assert_eq!(n as usize, count, "short write into test pipe");
}

/// Owner that records every `ready` callback it receives.
pub struct ReadProbe {
    log: Rc<RefCell<Vec<(i64, bool)>>>,
}

impl ReadProbe {
    pub fn new() -> (Box<ReadProbe>, Rc<RefCell<Vec<(i64, bool)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let probe = Box::new(ReadProbe { log: log.clone() });

        (probe, log)
    }
}

impl ReadReady for ReadProbe {
    fn ready(&mut self, size_or_offset: i64, hup: bool) {
        self.log.borrow_mut().push((size_or_offset, hup));
    }
}

/// Owner that records every `on_poll` callback it receives.
pub struct WriteProbe {
    log: Rc<RefCell<Vec<i64>>>,
}

impl WriteProbe {
    pub fn new() -> (Box<WriteProbe>, Rc<RefCell<Vec<i64>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let probe = Box::new(WriteProbe { log: log.clone() });

        (probe, log)
    }
}

impl WriteReady for WriteProbe {
    fn on_poll(&mut self, size_or_offset: i64) {
        self.log.borrow_mut().push(size_or_offset);
    }
}
