//! Event-loop liveness accounting.
//!
//! A [`KeepAlive`] cell tracks whether one entity currently contributes
//! a unit to the host loop's active count. When the active count is
//! zero the loop is free to idle or exit; any live cell holds it open.
//!
//! Keeping-alive is deliberately separate from registration: a
//! descriptor can stay registered with the kernel without holding the
//! loop open (a stdin pipe the user has explicitly unref'd, for
//! example).

use crate::event_loop::Loop;

/// Internal state of a [`KeepAlive`] cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Not contributing to the loop's active count.
    #[default]
    Inactive,

    /// Contributing exactly one unit to the loop's active count.
    Active,

    /// Permanently disabled; every further operation is a no-op.
    Done,
}

/// A latch that either contributes one unit to the host loop's active
/// count or does not.
///
/// All transitions are idempotent: a second `ref_` without an `unref`
/// in between does nothing, and vice versa, so the loop's counter can
/// never be double-adjusted by a single cell.
#[derive(Debug, Default)]
pub struct KeepAlive {
    state: State,
}

impl KeepAlive {
    /// A new, inactive cell.
    pub const fn new() -> KeepAlive {
        KeepAlive {
            state: State::Inactive,
        }
    }

    /// True iff the cell currently holds one unit of the active count.
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Starts keeping the loop alive. No-op unless the cell is inactive.
    pub fn ref_(&mut self, event_loop: &mut Loop) {
        if self.state != State::Inactive {
            return;
        }

        self.state = State::Active;
        event_loop.ref_();
    }

    /// Stops keeping the loop alive. No-op unless the cell is active.
    pub fn unref(&mut self, event_loop: &mut Loop) {
        if self.state != State::Active {
            return;
        }

        self.state = State::Inactive;
        event_loop.unref();
    }

    /// Thread-safe variant of [`ref_`](Self::ref_). The caller need not
    /// hold the loop thread; the loop's counter is adjusted atomically.
    pub fn ref_concurrently(&mut self, event_loop: &Loop) {
        if self.state != State::Inactive {
            return;
        }

        self.state = State::Active;
        event_loop.ref_concurrently();
    }

    /// Thread-safe variant of [`unref`](Self::unref).
    pub fn unref_concurrently(&mut self, event_loop: &Loop) {
        if self.state != State::Active {
            return;
        }

        self.state = State::Inactive;
        event_loop.unref_concurrently();
    }

    /// Same effect as [`unref`](Self::unref), but the active count only
    /// drops at the next tick boundary.
    ///
    /// This keeps the loop from observing a zero active count, and
    /// exiting, while a callback that triggered the unref is still
    /// executing.
    pub fn unref_on_next_tick(&mut self, event_loop: &mut Loop) {
        if self.state != State::Active {
            return;
        }

        self.state = State::Inactive;
        event_loop.defer_unref(1);
    }

    /// Thread-safe variant of [`unref_on_next_tick`](Self::unref_on_next_tick).
    pub fn unref_on_next_tick_concurrently(&mut self, event_loop: &Loop) {
        if self.state != State::Active {
            return;
        }

        self.state = State::Inactive;
        event_loop.defer_unref(1);
    }

    /// Forces an unref and permanently disables the cell. All later
    /// operations, including `ref_`, are no-ops.
    pub fn disable(&mut self, event_loop: &mut Loop) {
        if self.state == State::Done {
            return;
        }

        self.unref(event_loop);
        self.state = State::Done;
    }
}
