pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use session::{FaultKind, SessionConfig, SessionEvent, SessionHandle};
pub use state::SessionState;
pub use transport::{Connector, WsConnector};
