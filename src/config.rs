// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Plain configuration data assembled by the caller and handed to
//! [crate::server::Server::new]. No environment-variable or file-based
//! loading lives here; that is the embedding binary's job.

use std::net::IpAddr;

use crate::tls::TlsIdentity;

/// The listening address, ports, and optional TLS identity a [crate::server::Server]
/// is built from.
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub ports: Vec<u16>,
    pub tls: Option<TlsIdentity>,
}

impl ServerConfig {
    pub fn new(bind_addr: IpAddr, ports: Vec<u16>) -> Self {
        ServerConfig { bind_addr, ports, tls: None }
    }

    pub fn with_tls(mut self, tls: TlsIdentity) -> Self {
        self.tls = Some(tls);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn builds_plain_config_with_no_tls_by_default() {
        let config = ServerConfig::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), vec![8080]);
        assert!(config.tls.is_none());
        assert_eq!(config.ports, vec![8080]);
    }
}
