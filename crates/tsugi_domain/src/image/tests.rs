use super::digest::Digest;
use super::parse::{parse_fallback_only, parse_grammar_only};
use super::{normalize_registry_host, parse_image_ref, ImageRef};

#[test]
fn test_bare_name() {
    let r = parse_image_ref("redis:latest").unwrap();
    assert_eq!(r, ImageRef::new("docker.io", "library/redis", "latest"));
}

#[test]
fn test_namespaced_hub_image() {
    let r = parse_image_ref("traefik/traefik:v2.10").unwrap();
    assert_eq!(r, ImageRef::new("docker.io", "traefik/traefik", "v2.10"));
}

#[test]
fn test_custom_registry() {
    let r = parse_image_ref("gcr.io/project/app:v1").unwrap();
    assert_eq!(r, ImageRef::new("gcr.io", "project/app", "v1"));
}

#[test]
fn test_registry_with_port() {
    let r = parse_image_ref("registry.local:5000/team/app").unwrap();
    assert_eq!(r, ImageRef::new("registry.local:5000", "team/app", "latest"));
}

#[test]
fn test_localhost_registry() {
    let r = parse_image_ref("localhost/app:dev").unwrap();
    assert_eq!(r, ImageRef::new("localhost", "app", "dev"));
}

#[test]
fn test_no_tag_defaults_latest() {
    let r = parse_image_ref("alpine").unwrap();
    assert_eq!(r, ImageRef::new("docker.io", "library/alpine", "latest"));
}

#[test]
fn test_digest_pinned_resolves_to_latest() {
    // Truncated digest: the grammar rejects it, the fallback accepts it.
    let r = parse_image_ref("alpine@sha256:deadbeef").unwrap();
    assert_eq!(r, ImageRef::new("docker.io", "library/alpine", "latest"));
    assert!(parse_grammar_only("alpine@sha256:deadbeef").is_none());
}

#[test]
fn test_full_digest_accepted_by_grammar() {
    let full = "alpine@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    let r = parse_grammar_only(full).unwrap();
    assert_eq!(r, ImageRef::new("docker.io", "library/alpine", "latest"));
}

#[test]
fn test_hub_aliases_collapse() {
    for host in ["docker.io", "index.docker.io", "registry-1.docker.io"] {
        let r = parse_image_ref(&format!("{}/library/redis:7", host)).unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/redis");
    }
}

#[test]
fn test_rejects_garbage() {
    for bad in ["", "   ", "@sha256:abc", "a@", "/leading", "name:", "???bad???", "UPPER/Case"] {
        assert!(parse_image_ref(bad).is_err(), "should reject {:?}", bad);
    }
}

#[test]
fn test_canonicalize_idempotent() {
    for input in [
        "redis",
        "redis:7.2",
        "traefik/traefik:v2.10",
        "gcr.io/project/app:v1",
        "registry.local:5000/team/app",
        "ghcr.io/org/sub/app:nightly",
    ] {
        let first = parse_image_ref(input).unwrap();
        let second = parse_image_ref(&first.to_string()).unwrap();
        assert_eq!(first, second, "canonical form must reparse to itself");
    }
}

// The fallback must agree with the grammar on every well-formed input. The
// sweep crosses registries, repositories and tags and asserts both parsers
// produce the same reference.
#[test]
fn test_fallback_agrees_with_grammar() {
    let registries = [
        None,
        Some("docker.io"),
        Some("ghcr.io"),
        Some("registry.local:5000"),
        Some("localhost"),
        Some("localhost:5000"),
    ];
    let repositories = ["redis", "library/redis", "org/team/app", "my-app", "my_app", "a0/b1"];
    let tags = [None, Some("latest"), Some("v2.10"), Some("1.0-alpine"), Some("sha-abc123")];

    for registry in registries {
        for repository in repositories {
            for tag in tags {
                let mut input = String::new();
                if let Some(reg) = registry {
                    input.push_str(reg);
                    input.push('/');
                }
                input.push_str(repository);
                if let Some(tag) = tag {
                    input.push(':');
                    input.push_str(tag);
                }

                let grammar = parse_grammar_only(&input);
                let fallback = parse_fallback_only(&input);
                assert!(grammar.is_some(), "grammar rejected well-formed {:?}", input);
                assert_eq!(grammar, fallback, "parsers disagree on {:?}", input);
            }
        }
    }
}

#[test]
fn test_normalize_registry_host() {
    assert_eq!(normalize_registry_host("https://ghcr.io/"), "ghcr.io");
    assert_eq!(normalize_registry_host("GHCR.IO"), "ghcr.io");
    assert_eq!(normalize_registry_host("index.docker.io"), "docker.io");
    assert_eq!(normalize_registry_host("registry-1.docker.io"), "docker.io");
    assert_eq!(normalize_registry_host("http://registry.local:5000/"), "registry.local:5000");
}

#[test]
fn test_local_name_strips_hub_prefix() {
    let r = parse_image_ref("redis:7").unwrap();
    assert_eq!(r.local_name(), "redis:7");
    let r = parse_image_ref("ghcr.io/org/app:v1").unwrap();
    assert_eq!(r.local_name(), "ghcr.io/org/app:v1");
}

#[test]
fn test_valid_digest() {
    let valid = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    let d = Digest::new(valid);
    assert!(d.is_ok());
    assert_eq!(d.unwrap().as_str(), valid);
}

#[test]
fn test_invalid_digest_prefix() {
    let invalid = "md5:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    assert!(Digest::new(invalid).is_err());
}

#[test]
fn test_invalid_digest_length() {
    assert!(Digest::new("sha256:short").is_err());
}

#[test]
fn test_invalid_digest_chars() {
    let invalid = "sha256:g3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    assert!(Digest::new(invalid).is_err());
}
