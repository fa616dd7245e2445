mod keys;
pub mod memory;
pub mod model;

pub(crate) use keys::{key_prefix, looks_like_key};
pub use memory::Store;
pub use model::{ConsumeResult, Payload, SecretMeta, SecretView};
