pub mod auth;
pub mod authz;
pub mod cache;
pub mod gate;
pub mod rate_limit;
