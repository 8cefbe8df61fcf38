pub mod config;
pub mod engine;
pub mod fetch;
pub mod store;

mod api;

pub use api::create_api_router;
