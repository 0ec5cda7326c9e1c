//! HTTP front end of the pan/tilt camera mount.

pub mod assets;
pub mod config;
pub mod metrics;
pub mod routes;
pub mod server;

pub use config::ServerArgs;
pub use routes::{create_router, AppState};
pub use server::run_server;
