//! filecast - broadcast new files in a directory to WebSocket clients.
//!
//! A [`watcher::DirectoryWatcher`] produces file arrivals, the
//! [`source::SourceAdapter`] publishes them on a [`hub::BroadcastHub`], and
//! each WebSocket connection runs a [`session::ConnectionSession`] that
//! forwards its own copy of every event.

pub mod config;
pub mod error;
pub mod hub;
pub mod models;
pub mod server;
pub mod session;
pub mod source;
pub mod watcher;
