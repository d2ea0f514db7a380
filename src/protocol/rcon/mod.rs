//! Minecraft remote console (RCON) client.

pub mod client;
pub mod codec;

pub use client::{RconClient, RemoteConsole};
