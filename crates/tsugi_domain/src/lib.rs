pub mod credential;
pub mod image;
pub mod policy;
pub mod store;
pub mod update;

pub use tsugi_common::Result;
