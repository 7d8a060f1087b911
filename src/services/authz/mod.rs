pub mod engine;
pub mod ownership;
pub mod policy;

pub use engine::{AuthzEngine, Decision, DenyReason};
pub use ownership::{AnyOf, OwnershipCheck, OwnershipError};
pub use policy::{AccessPolicy, Action, PolicyTable, ResourceRef};
