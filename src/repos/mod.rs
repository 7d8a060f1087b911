pub mod project_repo;
pub mod task_repo;

pub use project_repo::{ProjectRepo, ProjectRow};
pub use task_repo::{TaskRepo, TaskRow};
