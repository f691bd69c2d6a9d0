//! rfcbridge Client
//!
//! Sessions, the value codec and the unit-of-work manager on top of a
//! backend RPC library.
//!
//! # Components
//!
//! - [`backend`] - The [`RfcBackend`](backend::RfcBackend) seam and an in-memory backend
//! - [`codec`] - Fill and wrap between host values and backend containers
//! - [`Connection`] - A synchronous session: calls, metadata and units
//! - [`AsyncConnection`] - A cloneable async handle that keeps blocking
//!   round-trips off the executor

pub mod async_connection;
pub mod backend;
pub mod codec;
pub mod connection;
pub mod unit;

pub use async_connection::AsyncConnection;
pub use connection::{CallOptions, Connection};
