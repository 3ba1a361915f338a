//! Full sync feature

pub mod routes;

pub use routes::sync_routes;
