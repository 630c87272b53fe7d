//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → handlers.rs (resolve binary, translate arguments)
//!         → exec (simple path) | pipeline (multisig path)
//!         → audit (one record per invocation)
//!     → response.rs (error → status + JSON detail)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::GatewayError;
pub use server::{AppState, HttpServer};
