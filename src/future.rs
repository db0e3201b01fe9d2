// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! One-shot [Promise]/[Future] channels. A [Promise] is resolved exactly
//! once, from anywhere; the paired [Future] is `.await`-able from a task on
//! the scheduler that created it.

use std::cell::RefCell;
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::fail::Fail;

enum Slot<T> {
    Pending(Vec<Waker>),
    Ready(Result<T, Fail>),
    Taken,
}

struct Inner<T> {
    slot: Slot<T>,
}

/// The write half of a one-shot channel. Resolves its paired [Future] with
/// `set_value` or `set_exception`; exactly one of the two may be called.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

/// The read half of a one-shot channel. Implements [std::future::Future], so
/// it is directly `.await`-able inside a coroutine running on the Scheduler.
pub struct Future<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

/// Creates a linked (Promise, Future) pair.
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let inner = Rc::new(RefCell::new(Inner { slot: Slot::Pending(Vec::new()) }));
    (Promise { inner: inner.clone() }, Future { inner })
}

impl<T> Promise<T> {
    pub fn set_value(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn set_exception(self, err: Fail) {
        self.complete(Err(err));
    }

    fn complete(self, result: Result<T, Fail>) {
        let wakers = {
            let mut inner = self.inner.borrow_mut();
            match std::mem::replace(&mut inner.slot, Slot::Ready(result)) {
                Slot::Pending(wakers) => wakers,
                Slot::Ready(_) | Slot::Taken => {
                    panic!("Promise resolved more than once")
                }
            }
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T> Future<T> {
    /// True iff the paired Promise has already resolved.
    pub fn await_ready(&self) -> bool {
        matches!(self.inner.borrow().slot, Slot::Ready(_))
    }

    /// An already-resolved Future carrying `value`.
    pub fn resolved(value: T) -> Self {
        let (promise, future) = channel();
        promise.set_value(value);
        future
    }

    /// An already-resolved Future carrying `err`.
    pub fn failed(err: Fail) -> Self {
        let (promise, future) = channel();
        promise.set_exception(err);
        future
    }
}

impl<T> StdFuture for Future<T> {
    type Output = Result<T, Fail>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match &mut inner.slot {
            Slot::Ready(_) => {
                let slot = std::mem::replace(&mut inner.slot, Slot::Taken);
                match slot {
                    Slot::Ready(result) => Poll::Ready(result),
                    _ => unreachable!(),
                }
            }
            Slot::Pending(wakers) => {
                wakers.push(cx.waker().clone());
                Poll::Pending
            }
            Slot::Taken => panic!("Future polled after it already resolved"),
        }
    }
}

/// Resolves when every future in `futures` resolves, yielding their values in
/// order; rejects with the first error encountered.
pub fn all<T>(
    futures: Vec<Future<T>>,
) -> impl StdFuture<Output = Result<Vec<T>, Fail>> {
    futures::future::try_join_all(futures)
}

/// `all`, specialized for `Future<()>`, used to fan a hook out over a list of
/// handlers (e.g. `pre_method` across every matched middleware).
pub async fn all_void(futures: Vec<Future<()>>) -> Result<(), Fail> {
    futures::future::try_join_all(futures).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn resolved_future_is_ready_immediately() {
        let future = Future::resolved(42);
        assert!(future.await_ready());
        assert_eq!(block_on(future).unwrap(), 42);
    }

    #[test]
    fn set_value_resolves_the_paired_future() {
        let (promise, future) = channel::<i32>();
        assert!(!future.await_ready());
        promise.set_value(7);
        assert!(future.await_ready());
        assert_eq!(block_on(future).unwrap(), 7);
    }

    #[test]
    fn set_exception_rejects_the_paired_future() {
        let (promise, future) = channel::<i32>();
        promise.set_exception(Fail::internal("boom"));
        let err = block_on(future).unwrap_err();
        assert!(matches!(err, Fail::Internal { .. }));
    }

    #[test]
    fn all_propagates_first_error() {
        let (promise_a, future_a) = channel::<i32>();
        let (promise_b, future_b) = channel::<i32>();
        promise_a.set_value(1);
        promise_b.set_exception(Fail::not_found("missing"));
        let result = block_on(all(vec![future_a, future_b]));
        assert!(matches!(result.unwrap_err(), Fail::NotFound { .. }));
    }
}
