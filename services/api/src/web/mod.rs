pub mod activity;
pub mod auth;
pub mod middleware;
pub mod problems;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use rest::{router, ApiDoc};
