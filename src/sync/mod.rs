// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::task::Waker;

/// Holds at most one pending [Waker]. An async operation that polls as
/// not-ready stores its waker here; the Event System callback that later
/// finds the underlying handle readable takes it back out and wakes it.
pub struct SomeWaker {
    waker: Option<Waker>,
}

/// Associate functions for [SomeWaker].
impl SomeWaker {
    /// Takes the waker out of the target cell, if any.
    pub fn take(&mut self) -> Option<Waker> {
        self.waker.take()
    }

    /// Places a waker in the target cell, replacing whatever was there.
    pub fn put(&mut self, waker: Option<Waker>) {
        self.waker = waker;
    }

    /// Wakes and clears whatever waker is currently held.
    pub fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Default trait implementation for [SomeWaker].
impl Default for SomeWaker {
    fn default() -> Self {
        Self { waker: None }
    }
}
