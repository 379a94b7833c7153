pub const PROTOCOL_VERSION: u16 = 0x0a55;

pub mod config;
pub mod error;
pub mod protocol;
pub mod rate_limit;
pub mod replay;
pub mod resolver;
pub mod state;
pub mod time;
pub mod transport;
pub mod validate;

pub use config::ServerConfig;
pub use error::ProtocolError;
pub use protocol::{Opcode, Packet, Payload};
pub use rate_limit::RateLimiter;
pub use replay::ReplayGuard;
pub use resolver::{AttackResolver, AttackResult};
pub use state::{SharedGameState, Stage};
pub use transport::SecureStream;
