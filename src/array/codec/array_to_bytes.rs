//! Array to bytes codecs.

pub mod bytes;
pub mod codec_chain;
#[cfg(feature = "image")]
pub mod image;
pub mod vlen;
