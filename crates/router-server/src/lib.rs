//! # Router Server
//!
//! HTTP surface for the agent router:
//! - Axum-based routing API (`/v1/route`, `/v1/outcomes`, analytics)
//! - Liveness and readiness probes
//! - Graceful shutdown coordination

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use server::{Server, ServerConfig};
pub use shutdown::ShutdownCoordinator;
pub use state::AppState;
