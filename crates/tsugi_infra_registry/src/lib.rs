pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthChallenge, AuthResolver, ResolvedAuth};
pub use client::RegistryClient;
pub use error::RegistryError;

/// Base URL of the v2 API for a normalized registry host. Docker Hub's
/// logical host serves its API from `registry-1.docker.io`. Loopback
/// hosts are reached over plain HTTP, matching how local registries run.
pub fn api_base(host: &str) -> String {
    match host {
        "docker.io" => "https://registry-1.docker.io".to_string(),
        _ if is_loopback(host) => format!("http://{}", host),
        _ => format!("https://{}", host),
    }
}

fn is_loopback(host: &str) -> bool {
    let name = match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    matches!(name, "localhost" | "127.0.0.1" | "[::1]")
}
