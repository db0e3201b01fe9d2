// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Owns the listening sockets and runs the per-port accept loops on top of
//! the scheduler. A `Server` is built once at startup: routers are
//! attached, `listen()` opens the sockets, then `run()` hands control to
//! the scheduler.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

use crate::config::ServerConfig;
use crate::fail::Fail;
use crate::http::Router;
use crate::net::Socket;
use crate::scheduler::Scheduler;
use crate::tls::{TlsOptions, TlsStream};

const ACCEPT_BACKLOG: i32 = 128;

struct Port {
    router: Router,
    socket: Option<Socket>,
}

/// Binds one or more routers to ports and drives their accept loops.
pub struct Server {
    bind_addr: IpAddr,
    tls: Option<Rc<TlsOptions>>,
    ports: HashMap<u16, Port>,
    listening: bool,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self, Fail> {
        let tls = config.tls.map(TlsOptions::new).transpose()?.map(Rc::new);
        Ok(Server { bind_addr: config.bind_addr, tls, ports: HashMap::new(), listening: false })
    }

    /// Mounts `router` on `port`. Fails with `Fail::AlreadyExists` if the
    /// port is already attached, or `Fail::FailedPrecondition` if the
    /// server is already listening.
    pub fn attach_router(&mut self, port: u16, router: Router) -> Result<(), Fail> {
        if self.listening {
            return Err(Fail::FailedPrecondition {
                message: "cannot attach a router after the server started listening".into(),
            });
        }
        if self.ports.contains_key(&port) {
            return Err(Fail::AlreadyExists { message: format!("port {} already attached", port) });
        }
        self.ports.insert(port, Port { router, socket: None });
        Ok(())
    }

    /// Opens and binds a listening socket for every attached port.
    pub fn listen(&mut self) -> Result<(), Fail> {
        for (port, entry) in self.ports.iter_mut() {
            let socket = Socket::new_tcp()?;
            socket.set_reuseaddr()?;
            socket.bind(SocketAddr::new(self.bind_addr, *port))?;
            socket.listen(ACCEPT_BACKLOG)?;
            entry.socket = Some(socket);
        }
        self.listening = true;
        Ok(())
    }

    /// Spawns one accept-loop task per attached port on the current
    /// scheduler, then runs the scheduler until it goes idle or `stop()`
    /// is called on a clone of it.
    pub fn run(&mut self) -> Result<(), Fail> {
        if !self.listening {
            self.listen()?;
        }
        let scheduler = Scheduler::current();
        for entry in self.ports.values_mut() {
            let socket = entry.socket.take().ok_or_else(|| {
                Fail::FailedPrecondition { message: "port has no listening socket".into() }
            })?;
            let router = entry.router.clone();
            let tls = self.tls.clone();
            scheduler.spawn(async move {
                accept_loop(socket, router, tls).await;
                Ok::<(), Fail>(())
            });
        }
        scheduler.run();
        Ok(())
    }

    /// Closes every attached listening socket iff every router reports no
    /// in-flight connections.
    pub fn try_close(&mut self) -> Result<bool, Fail> {
        if self.ports.values().any(|entry| entry.router.connection_count() > 0) {
            return Ok(false);
        }
        self.force_close();
        Ok(true)
    }

    /// Closes every listening socket and stops the scheduler, regardless of
    /// in-flight connections.
    pub fn force_close(&mut self) {
        for entry in self.ports.values_mut() {
            entry.socket = None;
        }
        Scheduler::current().stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RouterBuilder;
    use std::net::Ipv4Addr;

    fn test_config() -> ServerConfig {
        ServerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), vec![0])
    }

    #[test]
    fn attaching_the_same_port_twice_is_already_exists() {
        let mut server = Server::new(test_config()).unwrap();
        server.attach_router(8080, RouterBuilder::new().build()).unwrap();
        let err = server.attach_router(8080, RouterBuilder::new().build()).unwrap_err();
        assert!(matches!(err, Fail::AlreadyExists { .. }));
    }

    #[test]
    fn attaching_a_router_after_listening_is_failed_precondition() {
        let mut server = Server::new(test_config()).unwrap();
        server.attach_router(0, RouterBuilder::new().build()).unwrap();
        server.listen().unwrap();
        let err = server.attach_router(8081, RouterBuilder::new().build()).unwrap_err();
        assert!(matches!(err, Fail::FailedPrecondition { .. }));
    }

    #[test]
    fn try_close_succeeds_with_no_in_flight_connections() {
        let mut server = Server::new(test_config()).unwrap();
        server.attach_router(0, RouterBuilder::new().build()).unwrap();
        server.listen().unwrap();
        assert_eq!(server.try_close().unwrap(), true);
        assert!(server.ports.values().all(|entry| entry.socket.is_none()));
    }

    #[test]
    fn try_close_refuses_while_a_router_has_in_flight_connections() {
        use crate::testing::DuplexStream;

        let scheduler = Scheduler::current();
        let router = RouterBuilder::new().build();
        let (_far, near) = DuplexStream::pair();
        let router_clone = router.clone();
        scheduler.spawn(async move { router_clone.serve_connection(near).await });
        scheduler.turn();
        assert_eq!(router.connection_count(), 1);

        let mut server = Server::new(test_config()).unwrap();
        server.attach_router(0, router).unwrap();
        server.listen().unwrap();
        assert_eq!(server.try_close().unwrap(), false);
        assert!(server.ports.values().all(|entry| entry.socket.is_some()));
    }

    #[test]
    fn force_close_clears_every_listening_socket() {
        let mut server = Server::new(test_config()).unwrap();
        server.attach_router(0, RouterBuilder::new().build()).unwrap();
        server.listen().unwrap();
        server.force_close();
        assert!(server.ports.values().all(|entry| entry.socket.is_none()));
    }
}

async fn accept_loop(listener: Socket, router: Router, tls: Option<Rc<TlsOptions>>) {
    loop {
        let connection = match listener.accept().await {
            Ok(connection) => connection,
            Err(err) => {
                warn!("accept failed: {}", err);
                continue;
            }
        };

        let router = router.clone();
        let tls = tls.clone();
        Scheduler::current().spawn(async move {
            let result = match &tls {
                None => router.serve_connection(connection).await,
                Some(tls) => {
                    let conn = tls.new_connection()?;
                    let mut stream = TlsStream::new(connection, conn);
                    stream.handshake().await?;
                    router.serve_connection(stream).await
                }
            };
            if let Err(err) = &result {
                warn!("connection ended with an error: {}", err);
            }
            Ok::<(), Fail>(())
        });
    }
}
