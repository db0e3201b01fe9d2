// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Non-blocking TCP sockets driven by the scheduler's event system. [Socket]
//! is the concrete [CoStream]; the TLS adapter and the HTTP layer are built
//! generically over [CoStream] so they work the same whether or not the
//! connection is encrypted.

pub mod socket;

pub use socket::Socket;

use std::future::Future as StdFuture;
use std::pin::Pin;

use crate::fail::Fail;

/// A connection-oriented byte stream a coroutine can read from and write to
/// without blocking the scheduler's thread. Implemented by [Socket] and by
/// the TLS stream adapter.
pub trait CoStream {
    /// Reads at least one byte into `buf`, suspending until data is
    /// available. Returns `Ok(0)` only at end-of-stream.
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn StdFuture<Output = Result<usize, Fail>> + 'a>>;

    /// Writes as many bytes of `buf` as the stream accepts in one go,
    /// suspending if the stream isn't writable yet. May return fewer bytes
    /// than `buf.len()`; callers loop until the whole buffer is sent.
    fn write<'a>(
        &'a mut self,
        buf: &'a [u8],
    ) -> Pin<Box<dyn StdFuture<Output = Result<usize, Fail>> + 'a>>;
}
