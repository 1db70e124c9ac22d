//! Web front: one port serves the static page and the JSON phase API.
//!
//! A browser tab creates a session on load and drives the phases with plain HTTP requests.

mod protocol;
mod server;

pub use protocol::{ApiError, ApiResponse};
pub use server::{connect_gateway, router, run_server, AppState};
