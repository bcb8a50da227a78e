pub mod codec;
pub mod key;
pub mod service;

pub use codec::TokenCodec;
pub use key::{Identity, Key, KeyType};
pub use service::{IssuedKey, KeyRequest, KeyService};
