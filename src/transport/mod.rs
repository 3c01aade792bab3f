//! Transport layer: target address codec and the encrypted stream
//! wrapper.

pub mod address;
pub mod stream;

pub use address::Address;
pub use stream::{EncryptedReader, EncryptedWriter, ShadowStream};
