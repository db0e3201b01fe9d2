// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::event::{Callback, EventMask, EventSystem, Handle};
use crate::fail::Fail;

const EVENT_BUFFER_SIZE: usize = 32;

struct Registration {
    callback: Callback,
    one_shot: bool,
}

/// `epoll`-backed [EventSystem]. Each registered handle is tracked in both
/// the kernel's interest list and a side map keyed by fd, since `epoll_wait`
/// only gives us the fd back, not the callback.
pub struct EPoll {
    epoll_fd: RawFd,
    registrations: HashMap<RawFd, Registration>,
}

/// Associate functions for [EPoll].
impl EPoll {
    pub fn new() -> Result<Self, Fail> {
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(Fail::from(std::io::Error::last_os_error()));
        }
        Ok(Self { epoll_fd, registrations: HashMap::new() })
    }

    fn wait_ms(&mut self, timeout_ms: i32) -> Result<usize, Fail> {
        let mut events: Vec<libc::epoll_event> = vec![
            libc::epoll_event { events: 0, u64: 0 };
            EVENT_BUFFER_SIZE
        ];

        let available = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                events.as_mut_ptr(),
                events.len() as i32,
                timeout_ms,
            )
        };
        if available < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(Fail::from(err));
        }

        for event in &events[..available as usize] {
            let fd = event.u64 as RawFd;
            self.fire(fd)?;
        }

        Ok(available as usize)
    }

    /// Invokes the callback registered for `fd`, removing the registration
    /// first if it is one_shot so the callback can't observe its own entry.
    fn fire(&mut self, fd: RawFd) -> Result<(), Fail> {
        let mut registration = self.registrations.remove(&fd).ok_or_else(|| {
            Fail::internal(format!("epoll returned an event for unregistered handle {}", fd))
        })?;
        (registration.callback)();
        if !registration.one_shot {
            self.registrations.insert(fd, registration);
        }
        Ok(())
    }
}

impl EventSystem for EPoll {
    fn add(&mut self, handle: Handle, mask: EventMask, callback: Callback) -> Result<(), Fail> {
        if self.registrations.contains_key(&handle) {
            return Err(Fail::AlreadyExists {
                message: format!("handle {} is already registered with the event system", handle),
            });
        }

        let mut event = libc::epoll_event { events: mask.bits(), u64: handle as u64 };
        let rc = unsafe {
            libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, handle, &mut event)
        };
        if rc != 0 {
            return Err(Fail::from(std::io::Error::last_os_error()));
        }

        self.registrations.insert(
            handle,
            Registration { callback, one_shot: mask.is_one_shot() },
        );
        trace!("event system: registered handle {} for {:?}", handle, mask);
        Ok(())
    }

    fn remove(&mut self, handle: Handle) -> Result<(), Fail> {
        if self.registrations.remove(&handle).is_none() {
            return Err(Fail::InvalidArgument {
                message: format!("handle {} is not registered with the event system", handle),
            });
        }
        let rc = unsafe {
            libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, handle, std::ptr::null_mut())
        };
        if rc != 0 {
            return Err(Fail::from(std::io::Error::last_os_error()));
        }
        trace!("event system: unregistered handle {}", handle);
        Ok(())
    }

    fn has_pending_items(&self) -> bool {
        !self.registrations.is_empty()
    }

    fn wait(&mut self) -> Result<usize, Fail> {
        self.wait_ms(-1)
    }

    fn try_wait(&mut self) -> Result<usize, Fail> {
        self.wait_ms(0)
    }

    fn wait_for(&mut self, timeout: Duration) -> Result<usize, Fail> {
        let timeout_ms = timeout.as_millis();
        if timeout_ms > i32::MAX as u128 {
            return Err(Fail::InvalidArgument {
                message: format!("timeout can be no longer than {} milliseconds", i32::MAX),
            });
        }
        self.wait_ms(timeout_ms as i32)
    }
}

impl Drop for EPoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn pipe_fds() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    #[test]
    fn fires_callback_on_writable_handle() {
        let (read_fd, write_fd) = pipe_fds();
        let mut epoll = EPoll::new().unwrap();
        let fired = Rc::new(RefCell::new(false));
        let fired_clone = fired.clone();
        epoll
            .add(write_fd, EventMask::WRITABLE, Box::new(move || {
                *fired_clone.borrow_mut() = true;
            }))
            .unwrap();

        let count = epoll.wait_for(Duration::from_millis(100)).unwrap();
        assert_eq!(count, 1);
        assert!(*fired.borrow());

        epoll.remove(write_fd).unwrap();
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    #[test]
    fn add_twice_fails_with_already_exists() {
        let (read_fd, write_fd) = pipe_fds();
        let mut epoll = EPoll::new().unwrap();
        epoll.add(write_fd, EventMask::WRITABLE, Box::new(|| {})).unwrap();
        let err = epoll.add(write_fd, EventMask::WRITABLE, Box::new(|| {})).unwrap_err();
        assert!(matches!(err, Fail::AlreadyExists { .. }));
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    #[test]
    fn remove_unregistered_fails() {
        let mut epoll = EPoll::new().unwrap();
        let err = epoll.remove(999).unwrap_err();
        assert!(matches!(err, Fail::InvalidArgument { .. }));
    }

    #[test]
    fn one_shot_registration_is_not_invoked_twice() {
        let (read_fd, write_fd) = pipe_fds();
        let mut epoll = EPoll::new().unwrap();
        let count = Rc::new(RefCell::new(0));
        let count_clone = count.clone();
        epoll
            .add(
                write_fd,
                EventMask::WRITABLE | EventMask::ONE_SHOT,
                Box::new(move || {
                    *count_clone.borrow_mut() += 1;
                }),
            )
            .unwrap();

        epoll.wait_for(Duration::from_millis(100)).unwrap();
        assert_eq!(*count.borrow(), 1);
        assert!(!epoll.has_pending_items());

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
