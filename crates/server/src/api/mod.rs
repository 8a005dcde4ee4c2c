pub mod callbacks;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod sessions;
pub mod ws;

pub use routes::create_router;

use serde::Serialize;

/// Error body shared by all endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
