// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::collections::buffer::MutableBuffer;
use crate::collections::Buffer;
use crate::fail::Fail;
use crate::net::CoStream;

const DEFAULT_INITIAL_CAPACITY: usize = 4 * 1024;

/// Reads a [CoStream] through a growable buffer, so callers can ask for
/// "the next N bytes" or "up to the next delimiter" without caring how many
/// underlying `read()` calls that takes.
pub struct BufferedReader<S> {
    stream: S,
    buffer: MutableBuffer,
}

impl<S: CoStream> BufferedReader<S> {
    pub fn new(stream: S, max_capacity: usize) -> Self {
        Self::with_initial_capacity(stream, DEFAULT_INITIAL_CAPACITY.min(max_capacity), max_capacity)
    }

    pub fn with_initial_capacity(stream: S, initial_capacity: usize, max_capacity: usize) -> Self {
        BufferedReader { stream, buffer: MutableBuffer::new(initial_capacity, max_capacity) }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Reads exactly `n` bytes, buffering underlying reads as needed.
    /// Fails with `Fail::Unavailable` if the stream closes first, or
    /// `Fail::ResourceExhausted` if `n` exceeds the reader's max capacity.
    pub async fn read(&mut self, n: usize) -> Result<Buffer, Fail> {
        self.fill_until(|buf| buf.len() >= n).await?;
        let out = Buffer::copy_from(&self.buffer.read_window()[..n]);
        self.buffer.consume(n);
        Ok(out)
    }

    /// Reads up to and including the first occurrence of `delim`, or fails
    /// with `Fail::ResourceExhausted` if more than `limit` bytes accumulate
    /// first without finding one. If the stream hits EOF before `delim`
    /// appears, returns an empty buffer rather than an error -- the caller
    /// sees "nothing more to read", not a broken stream. Used for HTTP
    /// header-line parsing.
    pub async fn read_until(&mut self, delim: u8, limit: usize) -> Result<Buffer, Fail> {
        loop {
            if let Some(pos) = self.buffer.read_window().iter().position(|&b| b == delim) {
                let out = Buffer::copy_from(&self.buffer.read_window()[..=pos]);
                self.buffer.consume(pos + 1);
                return Ok(out);
            }
            if self.buffer.read_window().len() >= limit {
                return Err(Fail::ResourceExhausted {
                    message: format!("no delimiter found within {} bytes", limit),
                });
            }
            if !self.fill_more_or_eof().await? {
                return Ok(Buffer::empty());
            }
        }
    }

    /// Reads until `predicate(read_window)` is true, growing the buffer and
    /// pulling more bytes from the stream as needed.
    async fn fill_until(&mut self, predicate: impl Fn(&[u8]) -> bool) -> Result<(), Fail> {
        while !predicate(self.buffer.read_window()) {
            self.fill_more().await?;
        }
        Ok(())
    }

    /// Performs one underlying `read()`, growing the buffer first if its
    /// write window is empty. Fails with `Fail::Unavailable` at EOF.
    async fn fill_more(&mut self) -> Result<(), Fail> {
        if !self.fill_more_or_eof().await? {
            return Err(Fail::Unavailable {
                message: "stream closed before the requested data was available".into(),
            });
        }
        Ok(())
    }

    /// Performs one underlying `read()`, growing the buffer first if its
    /// write window is empty. Returns `Ok(false)` at EOF instead of failing,
    /// so callers that treat EOF as a normal outcome (`read_until`) don't
    /// have to unpack an error to tell it apart from a real I/O failure.
    async fn fill_more_or_eof(&mut self) -> Result<bool, Fail> {
        if self.buffer.write_window().is_empty() {
            let grow_by = self.buffer.read_window().len().max(1024);
            self.buffer.reserve(grow_by)?;
        }
        let n = self.stream.read(self.buffer.write_window()).await?;
        if n == 0 {
            return Ok(false);
        }
        self.buffer.commit_write(n);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::DuplexStream;
    use futures::executor::block_on;

    #[test]
    fn read_waits_for_enough_bytes_across_multiple_fills() {
        let (near, far) = DuplexStream::pair();
        far.enqueue(b"hel");
        far.enqueue(b"lo!");
        let mut reader = BufferedReader::new(near, 4096);
        let got = block_on(reader.read(5)).unwrap();
        assert_eq!(&got[..], b"hello");
    }

    #[test]
    fn read_until_finds_delimiter_across_fills() {
        let (near, far) = DuplexStream::pair();
        far.enqueue(b"GET / HTTP/1.1\r");
        far.enqueue(b"\n");
        let mut reader = BufferedReader::new(near, 4096);
        let line = block_on(reader.read_until(b'\n', 1024)).unwrap();
        assert_eq!(&line[..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn read_until_past_limit_is_resource_exhausted() {
        let (near, far) = DuplexStream::pair();
        far.enqueue(&vec![b'x'; 100]);
        let mut reader = BufferedReader::new(near, 4096);
        let err = block_on(reader.read_until(b'\n', 16)).unwrap_err();
        assert!(matches!(err, Fail::ResourceExhausted { .. }));
    }

    #[test]
    fn read_past_eof_is_unavailable() {
        let (near, far) = DuplexStream::pair();
        far.enqueue(b"ab");
        far.close();
        let mut reader = BufferedReader::new(near, 4096);
        let err = block_on(reader.read(5)).unwrap_err();
        assert!(matches!(err, Fail::Unavailable { .. }));
    }

    #[test]
    fn read_until_past_eof_is_an_empty_buffer() {
        let (near, far) = DuplexStream::pair();
        far.enqueue(b"no newline here");
        far.close();
        let mut reader = BufferedReader::new(near, 4096);
        let out = block_on(reader.read_until(b'\n', 1024)).unwrap();
        assert!(out.is_empty());
    }
}
