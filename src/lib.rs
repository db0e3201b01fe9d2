// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! A single-threaded cooperative async runtime: an OS readiness/event
//! system, a Future/Task coroutine abstraction built on native
//! `async`/`await`, buffered stream I/O, a TLS stream adapter, and an
//! HTTP/1.1 request router on top.
//!
//! Each OS thread that drives the runtime owns exactly one [scheduler::Scheduler];
//! tasks, sockets, and timers created on a thread are resumed on that same
//! thread. See [server::Server] for the entry point that ties routers to
//! listening sockets.

#[macro_use]
extern crate log;

pub mod collections;
pub mod config;
pub mod event;
pub mod fail;
pub mod future;
pub mod http;
pub mod io;
pub mod net;
pub mod scheduler;
pub mod server;
pub mod sync;
pub mod task;
pub mod tls;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ServerConfig;
pub use fail::Fail;
pub use scheduler::Scheduler;
pub use server::Server;
