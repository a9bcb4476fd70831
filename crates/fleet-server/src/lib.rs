//! # fleet-server
//!
//! Axum HTTP + WebSocket server for the fleet platform.
//!
//! - **WebSocket transport**: robots connect to `/ws`, identify with a
//!   `hello` frame, then exchange heartbeats, status updates, command
//!   envelopes, and acks
//! - **Transport gateway**: [`transport::WsTransport`] implements the
//!   coordination core's delivery contract over per-session channels
//! - **Monitoring**: `/health` and `/stats` read-only endpoints

#![deny(unsafe_code)]

pub mod health;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod ws;

pub use server::{AppState, FleetServer};
pub use transport::WsTransport;
