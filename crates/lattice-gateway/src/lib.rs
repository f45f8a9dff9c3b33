//! HTTP adapter between the relay engine and the chat platform gateway:
//! the [`client::GatewayClient`] implements the platform trait against a
//! REST surface, and [`events`] pulls the inbound event stream.

pub mod client;
pub mod events;

pub use client::{GatewayClient, GatewayError};
pub use events::run_event_pump;
