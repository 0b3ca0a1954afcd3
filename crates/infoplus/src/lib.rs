pub mod decoder;
pub mod duration;

pub use decoder::{decode_train, normalize_carrier, DecodeError, NS_CURRENT, NS_LEGACY};
