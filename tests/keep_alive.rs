mod common;

use common::TestCtx;
use fdpoll::{KeepAlive, Loop};

use std::thread;
use std::time::Duration;

#[test]
fn ref_unref_round_trip() {
    let mut event_loop = Loop::new().expect("create event loop");
    let mut cell = KeepAlive::new();

    assert!(!cell.is_active());
    assert_eq!(event_loop.active(), 0);

    cell.ref_(&mut event_loop);
    assert!(cell.is_active());
    assert_eq!(event_loop.active(), 1);

    cell.unref(&mut event_loop);
    assert!(!cell.is_active());
    assert_eq!(
        event_loop.active(),
        0,
        "ref then unref must leave the active count unchanged"
    );
}

#[test]
fn repeated_refs_count_once() {
    let mut event_loop = Loop::new().expect("create event loop");
    let mut cell = KeepAlive::new();

    cell.ref_(&mut event_loop);
    cell.ref_(&mut event_loop);
    cell.ref_(&mut event_loop);
    assert_eq!(event_loop.active(), 1, "a cell holds at most one unit");

    cell.unref(&mut event_loop);
    cell.unref(&mut event_loop);
    assert_eq!(event_loop.active(), 0, "a cell releases at most one unit");
}

#[test]
fn disable_is_permanent() {
    let mut event_loop = Loop::new().expect("create event loop");
    let mut cell = KeepAlive::new();

    cell.ref_(&mut event_loop);
    cell.disable(&mut event_loop);
    assert_eq!(event_loop.active(), 0, "disable must force an unref");
    assert!(!cell.is_active());

    cell.ref_(&mut event_loop);
    assert_eq!(event_loop.active(), 0, "refs after disable are no-ops");

    cell.disable(&mut event_loop);
    assert_eq!(event_loop.active(), 0, "disable on a done cell is a no-op");
}

#[test]
fn unref_on_next_tick_defers_until_tick_boundary() {
    let mut ctx = TestCtx::new();
    let mut cell = KeepAlive::new();

    cell.ref_(&mut ctx.event_loop);
    assert_eq!(ctx.event_loop.active(), 1);

    cell.unref_on_next_tick(&mut ctx.event_loop);
    assert!(!cell.is_active());
    assert_eq!(
        ctx.event_loop.active(),
        1,
        "the active count must hold until the tick boundary"
    );

    fdpoll::tick(&mut ctx, Some(Duration::from_millis(0))).expect("tick");
    assert_eq!(ctx.event_loop.active(), 0);
}

#[test]
fn concurrent_unref_from_worker_thread() {
    let event_loop = Loop::new().expect("create event loop");
    let mut cell = KeepAlive::new();

    cell.ref_concurrently(&event_loop);
    assert_eq!(event_loop.active(), 1);

    thread::scope(|scope| {
        scope.spawn(|| {
            cell.unref_concurrently(&event_loop);
        });
    });

    assert_eq!(
        event_loop.active(),
        0,
        "the loop thread must observe the worker's unref"
    );
}

#[test]
fn concurrent_unref_on_next_tick() {
    let mut ctx = TestCtx::new();
    let mut cell = KeepAlive::new();

    cell.ref_(&mut ctx.event_loop);

    thread::scope(|scope| {
        let event_loop = &ctx.event_loop;
        scope.spawn(move || {
            cell.unref_on_next_tick_concurrently(event_loop);
        });
    });

    assert_eq!(ctx.event_loop.active(), 1);

    fdpoll::tick(&mut ctx, Some(Duration::from_millis(0))).expect("tick");
    assert_eq!(ctx.event_loop.active(), 0);
}
