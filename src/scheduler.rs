// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The cooperative, single-threaded task scheduler. One [Scheduler] lives on
//! each thread that drives the runtime; it owns the thread's [EventSystem]
//! and is the only thing that ever polls a [Task].

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;
use std::time::{Duration, Instant};

use futures::task::ArcWake;
use slab::Slab;

use crate::event::epoll::EPoll;
use crate::event::{EventMask, EventSystem, Handle};
use crate::fail::Fail;
use crate::task::{ErasedTask, Task, TaskId};

struct TimerEntry {
    deadline: Instant,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline first.
        other.deadline.cmp(&self.deadline)
    }
}

struct Slot {
    task: Rc<dyn ErasedTask>,
    scheduled: bool,
}

struct Inner {
    tasks: Slab<Slot>,
    ready: VecDeque<TaskId>,
    timers: BinaryHeap<TimerEntry>,
    event_system: Box<dyn EventSystem>,
    running: bool,
}

/// A cheap, `Rc`-backed handle to the thread's scheduler. Cloning shares the
/// same underlying state; the scheduler itself is never sent across threads
/// (see the crate-level non-goal on pluggable multi-threaded backends).
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

thread_local! {
    static CURRENT: RefCell<Option<Scheduler>> = RefCell::new(None);
}

impl Scheduler {
    /// Builds a scheduler backed by a fresh `epoll` instance. Most callers
    /// want [Scheduler::current] instead.
    pub fn new() -> Result<Self, Fail> {
        Ok(Scheduler {
            inner: Rc::new(RefCell::new(Inner {
                tasks: Slab::new(),
                ready: VecDeque::new(),
                timers: BinaryHeap::new(),
                event_system: Box::new(EPoll::new()?),
                running: true,
            })),
        })
    }

    /// The calling thread's scheduler, lazily created on first use. Every
    /// task, socket, and timer in this crate is tied to whichever
    /// scheduler was current when it was created.
    pub fn current() -> Scheduler {
        CURRENT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(
                    Scheduler::new().expect("failed to initialize this thread's event system"),
                );
            }
            slot.as_ref().unwrap().clone()
        })
    }

    /// Starts `future` running on this scheduler and returns a handle to
    /// observe its completion. The task is polled for the first time on
    /// the next call to `run`/`turn`, not synchronously.
    pub fn spawn<T: 'static>(
        &self,
        future: impl StdFuture<Output = Result<T, Fail>> + 'static,
    ) -> Task<T> {
        let task = Task::new(Box::pin(future) as Pin<Box<dyn StdFuture<Output = Result<T, Fail>>>>);
        let mut inner = self.inner.borrow_mut();
        let id = TaskId(inner.tasks.insert(Slot { task: task.erased(), scheduled: true }));
        inner.ready.push_back(id);
        task
    }

    /// Registers `handle` with the event system so that, the next time it
    /// becomes ready for `mask`, `waker` fires. Used by socket and stream
    /// futures to suspend -- the registration is one-shot, matching the
    /// "poll, and if it would block, re-arm and return Pending" pattern
    /// every raw-syscall future in this crate follows.
    pub(crate) fn schedule_on(
        &self,
        handle: Handle,
        mask: EventMask,
        waker: Waker,
    ) -> Result<(), Fail> {
        self.inner.borrow_mut().event_system.add(
            handle,
            mask | EventMask::ONE_SHOT,
            Box::new(move || waker.wake_by_ref()),
        )
    }

    pub(crate) fn cancel_on(&self, handle: Handle) -> Result<(), Fail> {
        self.inner.borrow_mut().event_system.remove(handle)
    }

    /// Suspends the calling task until at least `duration` has elapsed.
    pub async fn sleep_for(duration: Duration) {
        Self::sleep_until(Instant::now() + duration).await
    }

    /// Suspends the calling task until `deadline`.
    pub async fn sleep_until(deadline: Instant) {
        SleepFuture { deadline, registered: false }.await
    }

    /// Yields to the scheduler once, giving other ready tasks a chance to
    /// run before the calling task resumes.
    pub async fn next_tick() {
        NextTick { yielded: false }.await
    }

    /// Runs the scheduler until `stop()` is called or there is no more work
    /// (no ready tasks, no armed timers, no pending registrations).
    pub fn run(&self) {
        self.inner.borrow_mut().running = true;
        loop {
            self.turn();
            let inner = self.inner.borrow();
            if !inner.running {
                break;
            }
            let idle = inner.ready.is_empty()
                && inner.timers.is_empty()
                && !inner.event_system.has_pending_items();
            if idle {
                break;
            }
        }
    }

    /// Stops `run`'s loop after the in-progress turn finishes.
    pub fn stop(&self) {
        self.inner.borrow_mut().running = false;
    }

    /// Runs one scheduling pass: fires any due timers, drains the ready
    /// queue, then blocks on the event system for however long until the
    /// next timer is due (or indefinitely, if there is none and nothing
    /// became ready).
    pub fn turn(&self) {
        self.fire_due_timers();
        self.drain_ready_queue();

        let wait_timeout = {
            let inner = self.inner.borrow();
            if !inner.ready.is_empty() {
                Some(Duration::from_millis(0))
            } else {
                inner.timers.peek().map(|timer| {
                    timer.deadline.saturating_duration_since(Instant::now())
                })
            }
        };

        let has_pending = self.inner.borrow().event_system.has_pending_items();
        if !has_pending && wait_timeout.is_none() {
            return;
        }

        let result = match wait_timeout {
            Some(timeout) => self.inner.borrow_mut().event_system.wait_for(timeout),
            None => self.inner.borrow_mut().event_system.wait(),
        };
        if let Err(err) = result {
            warn!("scheduler: event system wait failed: {}", err);
        }
    }

    fn fire_due_timers(&self) {
        let now = Instant::now();
        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                match inner.timers.peek() {
                    Some(entry) if entry.deadline <= now => inner.timers.pop(),
                    _ => None,
                }
            };
            match due {
                Some(entry) => entry.waker.wake(),
                None => break,
            }
        }
    }

    fn drain_ready_queue(&self) {
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                inner.ready.pop_front().map(|id| {
                    if let Some(slot) = inner.tasks.get_mut(id.0) {
                        slot.scheduled = false;
                    }
                    id
                })
            };
            let task_id = match next {
                Some(id) => id,
                None => break,
            };

            let task = {
                let inner = self.inner.borrow();
                inner.tasks.get(task_id.0).map(|slot| slot.task.clone())
            };
            let task = match task {
                Some(task) => task,
                None => continue,
            };

            let signal = Arc::new(WakeSignal { inner: self.inner.clone(), task_id });
            let waker = futures::task::waker(signal);
            task.resume(waker);

            if task.is_done() {
                self.inner.borrow_mut().tasks.remove(task_id.0);
            }
        }
    }

    pub(crate) fn push_timer(&self, deadline: Instant, waker: Waker) {
        self.inner.borrow_mut().timers.push(TimerEntry { deadline, waker });
    }
}

/// Bridges `std::task::Waker` to the scheduler's ready queue. Lives behind
/// an `Arc` because `futures::task::ArcWake` requires it, even though the
/// scheduler itself is strictly single-threaded -- this type is never
/// actually handed to another thread.
struct WakeSignal {
    inner: Rc<RefCell<Inner>>,
    task_id: TaskId,
}

// Safety: `WakeSignal` is only ever constructed and woken on the thread that
// owns its scheduler. The runtime has no multi-threaded backend (see the
// crate-level non-goal), so this invariant always holds in practice.
unsafe impl Send for WakeSignal {}
unsafe impl Sync for WakeSignal {}

impl ArcWake for WakeSignal {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let mut inner = arc_self.inner.borrow_mut();
        if let Some(slot) = inner.tasks.get_mut(arc_self.task_id.0) {
            if !slot.scheduled {
                slot.scheduled = true;
                inner.ready.push_back(arc_self.task_id);
            }
        }
    }
}

struct SleepFuture {
    deadline: Instant,
    registered: bool,
}

impl StdFuture for SleepFuture {
    type Output = ();

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<()> {
        if Instant::now() >= self.deadline {
            return std::task::Poll::Ready(());
        }
        if !self.registered {
            Scheduler::current().push_timer(self.deadline, cx.waker().clone());
            self.registered = true;
        }
        std::task::Poll::Pending
    }
}

struct NextTick {
    yielded: bool,
}

impl StdFuture for NextTick {
    type Output = ();

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<()> {
        if self.yielded {
            return std::task::Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        std::task::Poll::Pending
    }
}
