use std::fmt;
use std::io;

/// Everything that can go wrong while servicing one connection. All of these
/// are fatal to the connection that produced them; none of them ever touch
/// the shared game state or any other connection.
#[derive(Debug)]
pub enum ProtocolError {
    TransportClosed,
    ProtocolFraming,
    ChecksumMismatch,
    ReplayDetected,
    RateLimitExceeded,
    InvalidOpcode,
    InvalidPayload,
    InvalidUsername,
    ProtocolOrder,
    HeartbeatTimeout,
    Io(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::TransportClosed => write!(f, "transport closed"),
            ProtocolError::ProtocolFraming => write!(f, "malformed packet framing"),
            ProtocolError::ChecksumMismatch => write!(f, "checksum mismatch"),
            ProtocolError::ReplayDetected => write!(f, "replayed sequence number"),
            ProtocolError::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ProtocolError::InvalidOpcode => write!(f, "invalid opcode"),
            ProtocolError::InvalidPayload => write!(f, "invalid payload"),
            ProtocolError::InvalidUsername => write!(f, "invalid username"),
            ProtocolError::ProtocolOrder => write!(f, "packet out of order"),
            ProtocolError::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            ProtocolError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        // A zero-byte read/write on a stream reads as a clean close, not a
        // transport fault worth logging at error level.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::TransportClosed
        } else {
            ProtocolError::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
