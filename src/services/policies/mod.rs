pub mod policy;
pub mod service;

pub use policy::{Page, Policy, PolicyEntityType, PolicyPage};
pub use service::PolicyService;
