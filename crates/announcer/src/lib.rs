//! Now-playing announcer.
//!
//! Fetches the current track from the station playlist service and relays it
//! to an RDS encoder (TCP) or a Prostream relay (UDP).

pub mod cli;
pub mod config;
pub mod error;
pub mod playlist;
pub mod runtime;
pub mod transport;

pub use announcer_proto::{DeliveryOutcome, DeliveryResult, Protocol, Track};

#[cfg(test)]
mod test_support;
