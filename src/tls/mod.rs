// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! TLS stream adapter. [TlsStream] wraps any [crate::net::CoStream] and
//! speaks plaintext to its caller while pushing and pulling ciphertext over
//! the inner stream, driven entirely by `rustls`'s sans-io `Connection` API.

pub mod stream;

use std::io::BufReader;
use std::sync::Arc;

use rustls::{Certificate, PrivateKey};

use crate::fail::Fail;

pub use stream::TlsStream;

/// A certificate chain plus private key loaded from PEM files, used to
/// build a server-side TLS configuration.
pub struct TlsIdentity {
    pub certs: Vec<Certificate>,
    pub key: PrivateKey,
}

impl TlsIdentity {
    /// Loads a PEM certificate chain and a PEM (PKCS#8 or RSA) private key.
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, Fail> {
        let cert_file = std::fs::File::open(cert_path).map_err(Fail::from)?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .map_err(Fail::from)?
            .into_iter()
            .map(Certificate)
            .collect();

        let key_file = std::fs::File::open(key_path).map_err(Fail::from)?;
        let mut reader = BufReader::new(key_file);
        let key = rustls_pemfile::pkcs8_private_keys(&mut reader)
            .map_err(Fail::from)?
            .pop()
            .ok_or_else(|| Fail::invalid_argument(format!("no private key found in {}", key_path)))?;

        Ok(TlsIdentity { certs, key: PrivateKey(key) })
    }
}

/// Server-side TLS configuration: which identity to present, and whether the
/// raw connection even used TLS is decided upstream by [crate::server::Server].
pub struct TlsOptions {
    config: Arc<rustls::ServerConfig>,
}

impl TlsOptions {
    pub fn new(identity: TlsIdentity) -> Result<Self, Fail> {
        let config = rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(identity.certs, identity.key)
            .map_err(Fail::from)?;
        Ok(TlsOptions { config: Arc::new(config) })
    }

    pub fn new_connection(&self) -> Result<rustls::ServerConnection, Fail> {
        rustls::ServerConnection::new(self.config.clone()).map_err(Fail::from)
    }
}
