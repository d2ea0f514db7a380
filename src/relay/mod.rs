//! Relay core.
//!
//! Outbound: server log -> classifier -> chat. Inbound: chat -> dispatcher ->
//! command handlers -> remote console.

pub mod classifier;
pub mod dispatcher;
pub mod handlers;
pub mod registry;
pub mod session;
pub mod sink;
pub mod tailer;

#[cfg(test)]
pub mod testing;

pub use handlers::build_registry;
pub use registry::CommandRegistry;
pub use session::{RelaySession, SessionSettings};
pub use sink::ReplySink;
