// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! OS readiness notification. [EventSystem] is the trait the Scheduler
//! builds its suspension points on top of; [epoll::EPoll] is the only
//! backend (Linux `epoll`, matching the edge/level-triggered semantics the
//! runtime requires -- see the crate-level non-goals on pluggable backends).

pub mod epoll;

use std::ops::{BitOr, BitOrAssign, Sub, SubAssign};
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::fail::Fail;

pub type Handle = RawFd;

//==============================================================================
// EventMask
//==============================================================================

/// Bit set over the readiness conditions a registration can watch for. Round
/// trips losslessly to `libc::epoll_event.events`.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct EventMask(u32);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const READABLE: EventMask = EventMask(libc::EPOLLIN as u32);
    pub const WRITABLE: EventMask = EventMask(libc::EPOLLOUT as u32);
    pub const READ_CLOSED: EventMask = EventMask(libc::EPOLLRDHUP as u32);
    pub const PEER_CLOSED: EventMask = EventMask(libc::EPOLLHUP as u32);
    pub const PRIORITY: EventMask = EventMask(libc::EPOLLPRI as u32);
    pub const ERROR: EventMask = EventMask(libc::EPOLLERR as u32);
    pub const EDGE_TRIGGER: EventMask = EventMask(libc::EPOLLET as u32);
    pub const ONE_SHOT: EventMask = EventMask(libc::EPOLLONESHOT as u32);
    pub const WAKE_UP: EventMask = EventMask(libc::EPOLLWAKEUP as u32);
    pub const EXCLUSIVE: EventMask = EventMask(libc::EPOLLEXCLUSIVE as u32);

    /// The raw bits, in the underlying OS's representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        EventMask(bits)
    }

    /// True iff every bit set in `other` is also set in `self`.
    pub fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_one_shot(self) -> bool {
        self.contains(EventMask::ONE_SHOT)
    }
}

impl BitOr for EventMask {
    type Output = EventMask;
    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: EventMask) {
        self.0 |= rhs.0;
    }
}

/// Removes the bits of `rhs` from `self`.
impl Sub for EventMask {
    type Output = EventMask;
    fn sub(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 & !rhs.0)
    }
}

impl SubAssign for EventMask {
    fn sub_assign(&mut self, rhs: EventMask) {
        self.0 &= !rhs.0;
    }
}

//==============================================================================
// EventSystem
//==============================================================================

/// A callback invoked once when a registration fires.
pub type Callback = Box<dyn FnMut()>;

/// Interface for readiness-notification backends the Scheduler builds on.
pub trait EventSystem {
    /// Watches `handle` for `mask`, invoking `callback` each time it fires.
    /// `one_shot` registrations are removed by the backend immediately
    /// before the callback runs.
    ///
    /// Fails with `Fail::AlreadyExists` if `handle` is already registered.
    fn add(
        &mut self,
        handle: Handle,
        mask: EventMask,
        callback: Callback,
    ) -> Result<(), Fail>;

    /// Stops watching `handle` and drops its callback without invoking it.
    ///
    /// Fails with `Fail::InvalidArgument` if `handle` is not registered.
    fn remove(&mut self, handle: Handle) -> Result<(), Fail>;

    /// True iff at least one registration is currently armed.
    fn has_pending_items(&self) -> bool;

    /// Blocks until at least one registration fires; returns the number
    /// fired.
    fn wait(&mut self) -> Result<usize, Fail>;

    /// Like `wait`, but returns immediately if nothing is ready yet.
    fn try_wait(&mut self) -> Result<usize, Fail>;

    /// Like `wait`, bounded by `timeout`.
    ///
    /// Fails with `Fail::InvalidArgument` if `timeout` is negative or larger
    /// than the backend can represent.
    fn wait_for(&mut self, timeout: Duration) -> Result<usize, Fail>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_union_and_subtraction() {
        let mask = EventMask::READABLE | EventMask::WRITABLE;
        assert!(mask.contains(EventMask::READABLE));
        assert!(mask.contains(EventMask::WRITABLE));

        let only_writable = mask - EventMask::READABLE;
        assert!(!only_writable.contains(EventMask::READABLE));
        assert!(only_writable.contains(EventMask::WRITABLE));
    }

    #[test]
    fn intersects_is_any_bit() {
        let mask = EventMask::READABLE | EventMask::ERROR;
        assert!(mask.intersects(EventMask::ERROR));
        assert!(!mask.intersects(EventMask::WRITABLE));
    }
}
