//! Realtime Events - queue-to-WebSocket event relay
//!
//! Consumes notebook events from a durable Redis stream and fans every
//! event out to all connected WebSocket subscribers as a
//! `{ "type", "payload" }` envelope.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
