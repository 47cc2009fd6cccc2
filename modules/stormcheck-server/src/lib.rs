//! HTTP surface and background operation scheduling for the alert
//! cross-verification service.

pub mod auth;
pub mod jobs;
pub mod notify;
pub mod rest;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod summary;

pub use state::AppState;
