pub mod client;
pub mod engine;
pub mod error;
pub mod v1_45;

pub use client::DockerClient;
pub use engine::ContainerEngine;
pub use error::DockerError;
