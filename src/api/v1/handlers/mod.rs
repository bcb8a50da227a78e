pub mod health;
pub mod keys;
pub mod pats;
pub mod policies;
