//! Capability resolution: map a logical operation to a concrete tool name
//! from a server's cached tool listing.

/// Try each preferred name for an exact match, then fall back to the first
/// tool (in sorted order, for determinism) whose name contains every keyword
/// case-insensitively.
pub fn resolve_tool_name(
    available: &[String],
    preferred: &[&str],
    keywords: &[&str],
) -> Option<String> {
    for candidate in preferred {
        if available.iter().any(|name| name == candidate) {
            return Some(candidate.to_string());
        }
    }

    if keywords.is_empty() {
        return None;
    }

    let mut sorted: Vec<&String> = available.iter().collect();
    sorted.sort();

    sorted
        .into_iter()
        .find(|name| {
            let lower = name.to_lowercase();
            keywords.iter().all(|kw| lower.contains(&kw.to_lowercase()))
        })
        .cloned()
}
