pub mod api;
pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod middleware;
pub mod policies;
pub mod repos;
pub mod services;
pub mod state;
