pub mod cache;
pub mod callback;
pub mod keys;
pub mod pats;
pub mod policies;
