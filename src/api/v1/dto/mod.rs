pub mod projects;
pub mod session;
pub mod tasks;
