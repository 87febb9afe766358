//! HTTP front end for the relay
//!
//! ```text
//!   GET /poll?conference=<url>[&poll=<status>&tracker_status_at=<seq>&timeout=<ms>]
//!   GET /update?conference=<url>&tracker_status=<status>&tracker_status_at=<seq>
//!   GET /health
//! ```
//!
//! `GET /` is an alias for `/poll`.

pub mod api;
pub mod config;
pub mod server;

pub use config::ServerConfig;
pub use server::{AppState, RelayServer, ServerInfo};
