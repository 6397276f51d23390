//! filed: privileged filesystem administration over a local socket.
//!
//! A fixed pool of workers serves permission, ownership, copy, move,
//! remove, mkdir, and checksum commands submitted by any local caller over
//! a delimiter-joined text protocol. The broker keeps the pool at size,
//! recovers from worker crashes, and repairs its own endpoint permissions.

pub mod broker;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod ops;
pub mod wire;
pub mod worker;

pub use broker::{Broker, BrokerError, WorkerSpawner};
pub use client::{CallConfig, CallError, call};
pub use config::{Config, ConfigError};
