//! Discord side of the relay.
//!
//! Connects to the gateway, binds the configured channel and feeds its
//! messages to the relay dispatcher.

pub mod client;
pub mod handler;
pub mod sink;

pub use client::DiscordBotBuilder;
