//! # fdpoll
//!
//! **fdpoll** is a file-descriptor readiness layer for event-loop
//! runtimes. It sits between a process-wide event loop and the many
//! I/O-driven objects (pipes, sockets, subprocess exit watchers, DNS
//! resolvers, file sinks) that want to know when their descriptor
//! becomes readable, writable, or signals process exit.
//!
//! The crate provides:
//!
//! - A **recyclable registry of poll records**, each bound to one
//!   descriptor and one owning consumer, pooled in a fixed-capacity
//!   free list with deferred reclamation.
//! - A **uniform registration API** over two kernel readiness
//!   mechanisms: `epoll` on Linux and `kqueue`/`kevent64` on macOS,
//!   including one-shot rearm tracking and EOF/error extraction.
//! - **Liveness accounting**: a poll count (is this descriptor
//!   tracked?) and a keep-alive count (should it prevent the loop from
//!   exiting?) that move independently, from the loop thread or from
//!   other threads.
//! - **Safe dispatch** of readiness events back to owners through a
//!   tagged pointer, tolerant of records being recycled while an event
//!   for them is still in flight.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use fdpoll::{FilePoll, Owner, PollFlags, Watch};
//!
//! // ctx implements fdpoll::LoopContext for your runtime's loop.
//! let poll = FilePoll::init(ctx, fd, PollFlags::KEEPS_EVENT_LOOP_ALIVE, owner);
//! let poll = unsafe { &mut *poll.as_ptr() };
//!
//! poll.register(ctx.event_loop(), Watch::Readable, true)?;
//!
//! // ... fdpoll::tick(ctx, None) dispatches readiness to the owner ...
//!
//! poll.deinit(ctx);
//! ```
//!
//! ## Modules
//!
//! - [`record`] — the per-descriptor poll record and its lifecycle
//! - [`store`] — the recycling pool with deferred frees
//! - [`event_loop`] — the loop handle, liveness counters, and tick driver
//! - [`keep_alive`] — the keep-alive latch for non-record entities
//! - [`flags`] — the per-record flag set and kernel-event translators
//! - [`owner`] — the closed set of owner kinds and their callbacks

mod dispatch;
mod sys;

pub mod event_loop;
pub mod flags;
pub mod keep_alive;
pub mod owner;
pub mod record;
pub mod store;

pub use dispatch::{fdpoll__internal_dispatch_ready_poll, PollTag, TaggedPtr};
pub use event_loop::{tick, EventLoopKind, Loop, LoopContext};
pub use flags::{PollFlags, Watch};
pub use keep_alive::KeepAlive;
pub use owner::{Owner, OwnerKind};
pub use record::{FilePoll, INVALID_FD};
pub use store::PollStore;
pub use sys::{set_nonblocking, PollError};
