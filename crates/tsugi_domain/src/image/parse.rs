use super::r#ref::{ImageRef, DEFAULT_REGISTRY, DEFAULT_TAG};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tsugi_common::diagnostic::Diagnosable;

#[derive(Debug, Error)]
#[error("Invalid image reference: {0}")]
pub struct ParseRefError(pub String);

impl Diagnosable for ParseRefError {
    fn code(&self) -> String {
        "IMG_REF_INVALID".to_string()
    }
    fn suggestion(&self) -> Option<String> {
        Some("Expected registry/repository[:tag][@digest], e.g. ghcr.io/org/app:v1".to_string())
    }
}

// The distribution/reference grammar: optional domain (must contain a dot,
// a port, or be "localhost" to be distinguishable from the first repository
// segment), lower-case path components, optional tag, optional digest.
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^
        (?:
            (?P<domain>
                localhost (?: : [0-9]+ )?
              | [a-zA-Z0-9] (?: [a-zA-Z0-9-]* [a-zA-Z0-9] )?
                (?: \. [a-zA-Z0-9] (?: [a-zA-Z0-9-]* [a-zA-Z0-9] )? )+
                (?: : [0-9]+ )?
              | [a-zA-Z0-9] (?: [a-zA-Z0-9-]* [a-zA-Z0-9] )? : [0-9]+
            )
            /
        )?
        (?P<name>
            [a-z0-9]+ (?: (?: \. | _ | __ | -+ ) [a-z0-9]+ )*
            (?: / [a-z0-9]+ (?: (?: \. | _ | __ | -+ ) [a-z0-9]+ )* )*
        )
        (?: : (?P<tag> [\w] [\w.-]{0,127} ) )?
        (?: @ (?P<digest> [A-Za-z][A-Za-z0-9]* (?: [-_+.][A-Za-z][A-Za-z0-9]* )* : [0-9a-fA-F]{32,} ) )?
        $
    ",
    )
    .expect("reference grammar must compile")
});

/// Normalize a registry host for comparison: strip scheme and trailing
/// slash, lower-case, and collapse the Docker Hub aliases onto one value.
pub fn normalize_registry_host(host: &str) -> String {
    let host = host
        .trim()
        .strip_prefix("https://")
        .or_else(|| host.trim().strip_prefix("http://"))
        .unwrap_or(host.trim());
    let host = host.trim_end_matches('/').to_ascii_lowercase();
    match host.as_str() {
        "docker.io" | "registry-1.docker.io" | "index.docker.io" => DEFAULT_REGISTRY.to_string(),
        _ => host,
    }
}

/// Parse an image reference string into a fully qualified [`ImageRef`].
///
/// The grammar-based parser is authoritative; a manual fallback accepts a
/// few inputs the grammar rejects (notably truncated digests) and agrees
/// with the grammar on all well-formed references.
pub fn parse_image_ref(reference: &str) -> Result<ImageRef, ParseRefError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ParseRefError(reference.to_string()));
    }
    match parse_grammar(reference) {
        Some(parsed) => Ok(parsed),
        None => parse_fallback(reference).ok_or_else(|| ParseRefError(reference.to_string())),
    }
}

fn parse_grammar(reference: &str) -> Option<ImageRef> {
    let caps = REFERENCE.captures(reference)?;
    let domain = caps.name("domain").map(|m| m.as_str());
    let name = caps.name("name")?.as_str();
    let tag = caps.name("tag").map(|m| m.as_str());
    Some(qualify(domain, name, tag))
}

/// Manual parser: same heuristics as the grammar (first segment is a
/// registry iff it contains `.` or `:` or is `localhost`), but tolerant of
/// digest strings the grammar rejects.
fn parse_fallback(reference: &str) -> Option<ImageRef> {
    let rest = match reference.split_once('@') {
        Some((rest, digest)) if !rest.is_empty() && !digest.is_empty() => rest,
        Some(_) => return None,
        None => reference,
    };

    let (domain, name_and_tag) = match rest.split_once('/') {
        Some((first, remainder))
            if first == "localhost" || first.contains('.') || first.contains(':') =>
        {
            (Some(first), remainder)
        }
        _ => (None, rest),
    };

    // The tag separator is the last ':' after the last '/'.
    let (name, tag) = match name_and_tag.rfind(':') {
        Some(idx) if !name_and_tag[idx..].contains('/') => {
            (&name_and_tag[..idx], Some(&name_and_tag[idx + 1..]))
        }
        _ => (name_and_tag, None),
    };

    if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
        return None;
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/'))
    {
        return None;
    }
    if let Some(tag) = tag {
        if tag.is_empty()
            || !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return None;
        }
    }
    Some(qualify(domain, name, tag))
}

fn qualify(domain: Option<&str>, name: &str, tag: Option<&str>) -> ImageRef {
    let registry = domain
        .map(normalize_registry_host)
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());

    let repository = if registry == DEFAULT_REGISTRY && !name.contains('/') {
        format!("library/{}", name)
    } else {
        name.to_string()
    };

    // Digest-pinned references also land on `latest`: they are expected to
    // bypass the tag-based update flow entirely.
    let tag = tag.unwrap_or(DEFAULT_TAG);

    ImageRef::new(registry, repository, tag)
}

#[cfg(test)]
pub(crate) fn parse_grammar_only(reference: &str) -> Option<ImageRef> {
    parse_grammar(reference)
}

#[cfg(test)]
pub(crate) fn parse_fallback_only(reference: &str) -> Option<ImageRef> {
    parse_fallback(reference)
}
