//! json-crdt-relay: share one JSON value between peers through a relay.
//!
//! A [`ReplicationSession`] resolves which peer's initial state becomes
//! canonical for a channel and then exchanges incremental updates.
//! [`SessionHandle`] drives a session over a [`Transport`] on a tokio task.

pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use config::Config;
pub use error::SessionError;
pub use handle::{SessionHandle, SessionStatus};
pub use protocol::{ConsoleLevel, Message};
pub use session::{ReplicationSession, SessionEvent, SessionOptions, SessionState, SetState};
pub use transport::{ChannelAddress, MemoryTransport, Transport, TransportError, WebSocketTransport};
