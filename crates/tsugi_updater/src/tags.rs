//! Best-effort tag-version heuristic. Digest comparison is the primary
//! update signal; this only spots a strictly newer tag with the same shape
//! as the current one (same prefix, same suffix, same component count).

/// Decompose a tag into (prefix, numeric components, suffix):
/// `v2.10-alpine` -> ("v", [2, 10], "-alpine"). Tags without a numeric run
/// are not versioned and yield `None`.
fn parse_version(tag: &str) -> Option<(&str, Vec<u64>, &str)> {
    let digit_start = tag.find(|c: char| c.is_ascii_digit())?;
    let (prefix, rest) = tag.split_at(digit_start);

    let num_end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let (numbers, suffix) = rest.split_at(num_end);

    let components: Option<Vec<u64>> = numbers
        .trim_end_matches('.')
        .split('.')
        .map(|part| part.parse().ok())
        .collect();

    Some((prefix, components?, suffix))
}

/// The highest available tag matching the current tag's pattern, if it is
/// strictly newer. `None` when the current tag is not versioned or nothing
/// newer matches.
pub fn latest_matching_tag(current: &str, available: &[String]) -> Option<String> {
    let (prefix, components, suffix) = parse_version(current)?;

    let mut best: Option<(Vec<u64>, &str)> = None;
    for candidate in available {
        let Some((c_prefix, c_components, c_suffix)) = parse_version(candidate) else {
            continue;
        };
        if c_prefix != prefix || c_suffix != suffix || c_components.len() != components.len() {
            continue;
        }
        if c_components <= components {
            continue;
        }
        match &best {
            Some((best_components, _)) if &c_components <= best_components => {}
            _ => best = Some((c_components, candidate)),
        }
    }

    best.map(|(_, tag)| tag.to_string())
}
