//! Chrome DevTools Protocol client
//!
//! A small hand-rolled CDP client over WebSocket: one browser-level
//! connection in flatten mode, with per-target session ids carried in the
//! message envelope.

pub mod client;
pub mod transport;
pub mod types;

pub use client::CdpClient;
pub use transport::{CdpEvent, CdpTransport};
pub use types::{TargetInfo, VersionInfo};
