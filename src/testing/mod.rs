// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! An in-memory [crate::net::CoStream] for exercising the buffered reader,
//! TLS adapter, and HTTP layer without a real socket.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::fail::Fail;
use crate::net::CoStream;

struct Inner {
    queue: VecDeque<u8>,
    closed: bool,
    waker: Option<Waker>,
}

impl Inner {
    fn new() -> Self {
        Inner { queue: VecDeque::new(), closed: false, waker: None }
    }
}

/// One end of an in-memory duplex pipe. `DuplexStream::pair()` returns both
/// ends; bytes written to one are read from the other.
pub struct DuplexStream {
    inbound: Rc<RefCell<Inner>>,
    outbound: Rc<RefCell<Inner>>,
}

impl DuplexStream {
    pub fn pair() -> (DuplexStream, DuplexStream) {
        let a = Rc::new(RefCell::new(Inner::new()));
        let b = Rc::new(RefCell::new(Inner::new()));
        (
            DuplexStream { inbound: a.clone(), outbound: b.clone() },
            DuplexStream { inbound: b, outbound: a },
        )
    }

    /// Injects `data` as if the peer had written it, without going through
    /// an async `write()` call. Wakes a pending reader, if any.
    pub fn enqueue(&self, data: &[u8]) {
        let mut inner = self.outbound.borrow_mut();
        inner.queue.extend(data.iter().copied());
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }

    /// Marks the peer's end as closed; subsequent reads on the other side
    /// see end-of-stream once the queue drains.
    pub fn close(&self) {
        let mut inner = self.outbound.borrow_mut();
        inner.closed = true;
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }
}

impl CoStream for DuplexStream {
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn StdFuture<Output = Result<usize, Fail>> + 'a>> {
        Box::pin(ReadFuture { inbound: &self.inbound, buf })
    }

    fn write<'a>(
        &'a mut self,
        buf: &'a [u8],
    ) -> Pin<Box<dyn StdFuture<Output = Result<usize, Fail>> + 'a>> {
        let mut inner = self.outbound.borrow_mut();
        inner.queue.extend(buf.iter().copied());
        let waker = inner.waker.take();
        drop(inner);
        if let Some(waker) = waker {
            waker.wake();
        }
        Box::pin(std::future::ready(Ok(buf.len())))
    }
}

struct ReadFuture<'a> {
    inbound: &'a Rc<RefCell<Inner>>,
    buf: &'a mut [u8],
}

impl<'a> StdFuture for ReadFuture<'a> {
    type Output = Result<usize, Fail>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<usize, Fail>> {
        let this = self.get_mut();
        let mut inner = this.inbound.borrow_mut();
        if inner.queue.is_empty() {
            if inner.closed {
                return Poll::Ready(Ok(0));
            }
            inner.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = inner.queue.len().min(this.buf.len());
        for slot in this.buf[..n].iter_mut() {
            *slot = inner.queue.pop_front().unwrap();
        }
        Poll::Ready(Ok(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn write_on_one_end_is_visible_as_a_read_on_the_other() {
        let (mut a, mut b) = DuplexStream::pair();
        block_on(a.write(b"hi")).unwrap();
        let mut buf = [0u8; 2];
        let n = block_on(b.read(&mut buf)).unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[test]
    fn close_yields_eof_after_queue_drains() {
        let (a, mut b) = DuplexStream::pair();
        a.enqueue(b"x");
        a.close();
        let mut buf = [0u8; 4];
        assert_eq!(block_on(b.read(&mut buf)).unwrap(), 1);
        assert_eq!(block_on(b.read(&mut buf)).unwrap(), 0);
    }
}
