// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! [Task] is a lazily-started coroutine frame. Rust's `async`/`.await`
//! already supplies the compiler-generated state machine the original
//! runtime built by hand, so a [Task] is just a boxed future plus the
//! bookkeeping (`done`, `get`, manual `resume`) the rest of the runtime
//! needs to drive it from outside an `.await`.

use std::cell::RefCell;
use std::fmt;
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::fail::Fail;

/// Identifies a task inside a Scheduler's arena. Holding a `TaskId` rather
/// than a pointer is how the Scheduler and Task refer to each other without
/// a reference cycle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display(fmt = "Task(#{})", _0)]
pub struct TaskId(pub(crate) usize);

enum TaskState<T> {
    Pending,
    Ready(Result<T, Fail>),
    Taken,
}

struct Shared<T> {
    future: RefCell<Pin<Box<dyn StdFuture<Output = Result<T, Fail>>>>>,
    state: RefCell<TaskState<T>>,
    ready_check: RefCell<Option<Box<dyn Fn() -> bool>>>,
    completion_wakers: RefCell<Vec<Waker>>,
}

/// A suspendable computation producing a `Result<T, Fail>`. Created via
/// [crate::scheduler::Scheduler::spawn]; also directly `.await`-able to wait
/// for the task's completion.
pub struct Task<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task { shared: self.shared.clone() }
    }
}

/// Type-erased handle the Scheduler stores in its task arena: enough to
/// resume a task and check whether it's finished without knowing its output
/// type.
pub(crate) trait ErasedTask {
    /// Polls the task's future once with `waker`; stores the result if it
    /// completes and wakes any completion-awaiters.
    fn resume(&self, waker: Waker);
    fn is_done(&self) -> bool;
    fn is_ready(&self) -> bool;
}

impl<T> ErasedTask for Shared<T> {
    fn resume(&self, waker: Waker) {
        if !matches!(*self.state.borrow(), TaskState::Pending) {
            return;
        }
        let mut future = self.future.borrow_mut();
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                *self.state.borrow_mut() = TaskState::Ready(result);
                for waker in self.completion_wakers.borrow_mut().drain(..) {
                    waker.wake();
                }
            }
            Poll::Pending => {}
        }
    }

    fn is_done(&self) -> bool {
        !matches!(*self.state.borrow(), TaskState::Pending)
    }

    fn is_ready(&self) -> bool {
        match &*self.ready_check.borrow() {
            Some(check) => check(),
            None => true,
        }
    }
}

impl<T> Task<T> {
    pub(crate) fn new(future: Pin<Box<dyn StdFuture<Output = Result<T, Fail>>>>) -> Self {
        Task {
            shared: Rc::new(Shared {
                future: RefCell::new(future),
                state: RefCell::new(TaskState::Pending),
                ready_check: RefCell::new(None),
                completion_wakers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn erased(&self) -> Rc<dyn ErasedTask> {
        self.shared.clone()
    }

    /// True once the task's body has returned or failed.
    pub fn done(&self) -> bool {
        self.shared.is_done()
    }

    /// True iff the task's current suspension's readiness predicate (set by
    /// a time-based wait) is satisfied. Tasks with no such predicate are
    /// always ready.
    pub fn ready(&self) -> bool {
        self.shared.is_ready()
    }

    /// Installs the readiness predicate a time-based suspension uses to
    /// decide whether `ready()` should report true. Internal: called by
    /// suspension points that need it (e.g. `sleep_for`).
    pub(crate) fn set_ready_check(&self, check: Box<dyn Fn() -> bool>) {
        *self.shared.ready_check.borrow_mut() = Some(check);
    }

    /// Single-steps the task's body. Returns whether it is still not done.
    pub fn resume(&self) -> bool {
        self.shared.resume(noop_waker());
        !self.done()
    }

    /// Extracts the task's result. Valid exactly once after `done()` is
    /// true; a second call, or a call before completion, fails with
    /// `Fail::FailedPrecondition`.
    pub fn get(&self) -> Result<T, Fail> {
        let mut state = self.shared.state.borrow_mut();
        match std::mem::replace(&mut *state, TaskState::Taken) {
            TaskState::Ready(result) => result,
            TaskState::Pending => {
                *state = TaskState::Pending;
                Err(Fail::FailedPrecondition {
                    message: "Task is not done; check Task::done() before Task::get()".into(),
                })
            }
            TaskState::Taken => Err(Fail::FailedPrecondition {
                message: "Task::get() already called once for this Task".into(),
            }),
        }
    }
}

/// Awaiting a Task drives it directly (bypassing the ready queue) and
/// completes when its body does, independent of whether the Scheduler has
/// also separately spawned and is auto-driving it.
impl<T> StdFuture for Task<T> {
    type Output = Result<T, Fail>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.done() {
            return Poll::Ready(self.get());
        }
        self.shared.resume(cx.waker().clone());
        if self.done() {
            Poll::Ready(self.get())
        } else {
            self.shared.completion_wakers.borrow_mut().push(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task(done={})", self.done())
    }
}

/// A waker that does nothing when woken, for manual `resume()` calls where
/// nobody is listening for a re-wake (the caller is expected to call
/// `resume()` again itself).
fn noop_waker() -> Waker {
    use std::task::{RawWaker, RawWakerVTable};

    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);

    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    #[test]
    fn resume_steps_to_completion() {
        let task = Task::new(Box::pin(ready(Ok::<_, Fail>(5))));
        assert!(!task.done());
        assert!(!task.resume());
        assert!(task.done());
        assert_eq!(task.get().unwrap(), 5);
    }

    #[test]
    fn get_before_done_is_failed_precondition() {
        let task: Task<i32> = Task::new(Box::pin(std::future::pending()));
        let err = task.get().unwrap_err();
        assert!(matches!(err, Fail::FailedPrecondition { .. }));
    }

    #[test]
    fn get_twice_is_failed_precondition() {
        let task = Task::new(Box::pin(ready(Ok::<_, Fail>(1))));
        task.resume();
        assert!(task.get().is_ok());
        assert!(matches!(task.get().unwrap_err(), Fail::FailedPrecondition { .. }));
    }
}
