pub mod digest;
pub mod parse;
pub mod r#ref;

pub use digest::Digest;
pub use parse::{normalize_registry_host, parse_image_ref, ParseRefError};
pub use r#ref::ImageRef;

#[cfg(test)]
mod tests;
