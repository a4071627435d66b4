//! Core identifier and policy types.

pub mod id;
pub mod policy;

pub use id::{ActorId, OperationId, ResourceId};
pub use policy::SchedulingPolicy;
