pub mod error;
pub mod instrumented;
pub mod key_repo;
pub mod pat_repo;
pub mod policy_repo;
