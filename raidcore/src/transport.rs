//! The byte-stream abstraction the core needs from an encrypted transport.
//! The concrete TLS implementation (certificate loading, handshake,
//! verification policy) lives outside the core, in `raidserver::tls`.

use std::io;

/// A handshake-then-read/write encrypted byte stream. `Read`/`Write` carry
/// the actual packet bytes; `handshake`/`verify_peer`/`shutdown` bracket the
/// connection's encrypted-transport lifecycle.
pub trait SecureStream: io::Read + io::Write {
    /// Performs (or confirms completion of) the transport handshake.
    /// Implementations that complete the handshake during construction
    /// (e.g. a blocking `rustls::StreamOwned`) may make this a no-op.
    fn handshake(&mut self) -> io::Result<()>;

    /// Returns whether the remote peer presented a certificate this stream
    /// considers valid under its configured trust policy.
    fn verify_peer(&self) -> bool;

    /// Sets the timeout applied to subsequent reads; `None` blocks
    /// indefinitely. Used to implement the 5-second receive timeout in
    /// `Playing` without polling.
    fn set_read_timeout(&mut self, timeout: Option<std::time::Duration>) -> io::Result<()>;

    /// Cleanly tears down the transport. Safe to call more than once.
    fn shutdown(&mut self) -> io::Result<()>;
}
