//! The concrete `SecureStream` implementation: a blocking rustls TLS server
//! connection layered over a `TcpStream`. Certificate/key loading and the
//! mTLS trust policy live here, outside the core, per the core's
//! `SecureStream` abstraction boundary.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use raidcore::SecureStream;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig as RustlsServerConfig, ServerConnection, StreamOwned};

pub struct TlsStream {
    inner: StreamOwned<ServerConnection, TcpStream>,
    mutual_tls: bool,
}

impl TlsStream {
    pub fn accept(
        tcp: TcpStream,
        tls_config: Arc<RustlsServerConfig>,
        mutual_tls: bool,
    ) -> io::Result<TlsStream> {
        let conn = ServerConnection::new(tls_config)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let mut stream = TlsStream {
            inner: StreamOwned::new(conn, tcp),
            mutual_tls,
        };
        stream.handshake()?;
        Ok(stream)
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SecureStream for TlsStream {
    fn handshake(&mut self) -> io::Result<()> {
        while self.inner.conn.is_handshaking() {
            self.inner.conn.complete_io(&mut self.inner.sock)?;
        }
        Ok(())
    }

    fn verify_peer(&self) -> bool {
        if !self.mutual_tls {
            return true;
        }
        self.inner
            .conn
            .peer_certificates()
            .map(|certs| !certs.is_empty())
            .unwrap_or(false)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.sock.set_read_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.inner.conn.send_close_notify();
        let _ = self.inner.conn.complete_io(&mut self.inner.sock);
        let _ = self.inner.sock.shutdown(Shutdown::Both);
        Ok(())
    }
}

fn load_certs(path: &str) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(Path::new(path))?;
    rustls_pemfile::certs(&mut BufReader::new(file)).collect()
}

fn load_private_key(path: &str) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(Path::new(path))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found"))
}

fn load_root_store(ca_path: &str) -> io::Result<rustls::RootCertStore> {
    let mut store = rustls::RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        store
            .add(cert)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    }
    Ok(store)
}

/// Builds the rustls server config from `ServerConfig`'s cert/key/CA paths.
/// When a CA is configured, the server requires and verifies a client
/// certificate (mutual TLS); otherwise it accepts any client.
pub fn build_tls_config(cfg: &raidcore::ServerConfig) -> io::Result<(Arc<RustlsServerConfig>, bool)> {
    let certs = load_certs(&cfg.cert_path)?;
    let key = load_private_key(&cfg.key_path)?;

    let builder = RustlsServerConfig::builder();

    let (tls_config, mutual_tls) = if let Some(ca_path) = &cfg.ca_path {
        let roots = Arc::new(load_root_store(ca_path)?);
        let verifier = rustls::server::WebPkiClientVerifier::builder(roots)
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let config = builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        (config, true)
    } else {
        let config = builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        (config, false)
    };

    Ok((Arc::new(tls_config), mutual_tls))
}
