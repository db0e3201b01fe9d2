// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::future::Future as StdFuture;
use std::io::{Read, Write};
use std::pin::Pin;

use rustls::Connection;

use crate::fail::Fail;
use crate::net::CoStream;

const RAW_READ_CHUNK: usize = 16 * 1024;

/// Adapts a `rustls::Connection` (either half; `C` is `ServerConnection` or
/// `ClientConnection`) to speak plaintext over an arbitrary [CoStream].
/// Every plaintext read or write may need several rounds of "push
/// ciphertext in, pull ciphertext out" against the inner stream before it
/// can complete -- `pump_read`/`flush_writes` are that loop.
pub struct TlsStream<S, C> {
    stream: S,
    conn: C,
}

impl<S: CoStream, C: Connection> TlsStream<S, C> {
    pub fn new(stream: S, conn: C) -> Self {
        TlsStream { stream, conn }
    }

    /// Drives the handshake to completion. A no-op if it already finished.
    pub async fn handshake(&mut self) -> Result<(), Fail> {
        while self.conn.is_handshaking() {
            self.flush_writes().await?;
            if self.conn.is_handshaking() {
                self.pump_read().await?;
            }
        }
        Ok(())
    }

    /// Reads decrypted application data into `buf`, suspending to pull and
    /// process more ciphertext as needed. Returns `Ok(0)` at a clean TLS
    /// close-notify.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Fail> {
        loop {
            match self.conn.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(Fail::from(err)),
            }
            self.pump_read().await?;
        }
    }

    /// Encrypts `buf` and flushes it to the inner stream. Always consumes
    /// the whole buffer (rustls buffers plaintext internally) or fails.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, Fail> {
        let n = self.conn.writer().write(buf).map_err(Fail::from)?;
        self.flush_writes().await?;
        Ok(n)
    }

    /// Pulls one chunk of ciphertext from the inner stream, feeds it to
    /// rustls, and lets any response ciphertext (e.g. handshake replies)
    /// drain back out before returning.
    async fn pump_read(&mut self) -> Result<(), Fail> {
        let mut raw = [0u8; RAW_READ_CHUNK];
        let n = self.stream.read(&mut raw).await?;
        if n == 0 {
            return Err(Fail::Unavailable {
                message: "TLS stream closed by peer before close-notify".into(),
            });
        }
        let mut cursor = &raw[..n];
        self.conn.read_tls(&mut cursor).map_err(Fail::from)?;
        self.conn.process_new_packets().map_err(Fail::from)?;
        self.flush_writes().await?;
        Ok(())
    }

    /// Pushes every pending ciphertext record rustls has queued for us out
    /// over the inner stream.
    async fn flush_writes(&mut self) -> Result<(), Fail> {
        while self.conn.wants_write() {
            let mut out = Vec::new();
            self.conn.write_tls(&mut out).map_err(Fail::from)?;
            if !out.is_empty() {
                let mut sent = 0;
                while sent < out.len() {
                    sent += self.stream.write(&out[sent..]).await?;
                }
            }
        }
        Ok(())
    }
}

impl<S: CoStream, C: Connection> CoStream for TlsStream<S, C> {
    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn StdFuture<Output = Result<usize, Fail>> + 'a>> {
        Box::pin(TlsStream::read(self, buf))
    }

    fn write<'a>(
        &'a mut self,
        buf: &'a [u8],
    ) -> Pin<Box<dyn StdFuture<Output = Result<usize, Fail>> + 'a>> {
        Box::pin(TlsStream::write(self, buf))
    }
}
