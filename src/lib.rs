//! # solidq
//!
//! Multi-tenant persistent work queue.
//!
//! Each tenant owns one SQLite file holding named FIFO channels of work
//! items. The [`engine::Engine`] gives atomic push/pop/count/reset over one
//! file, the [`registry::Registry`] maps tenant names to open engines, and
//! the [`address`] module resolves `tenant:channel:id` strings. An axum
//! [`server`] and a reqwest [`client`] with a polling worker loop sit on top.

pub mod address;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod server;
mod storage;
pub mod telemetry;
