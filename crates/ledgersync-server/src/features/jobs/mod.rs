//! Sync job queries

pub mod queries;
pub mod routes;

pub use queries::{ListJobsQuery, ListJobsResponse};
pub use routes::jobs_routes;
