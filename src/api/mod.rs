//! Dashboard HTTP API

mod handlers;
mod routes;

pub use routes::create_api_router;
