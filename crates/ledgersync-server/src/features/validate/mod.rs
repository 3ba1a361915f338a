//! Integrity validation feature

pub mod routes;

pub use routes::validate_routes;
