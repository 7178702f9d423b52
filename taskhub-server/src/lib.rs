//! Taskhub backend library.
//!
//! Exposes the server for use in tests and embedding. The server exposes a
//! REST API for entities, projects, stages, tasks, and comments, plus
//! WebSocket endpoints that push notification envelopes for every state
//! change to global and per-project subscribers.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod registry;
pub mod server;
pub mod store;
pub mod ws;
