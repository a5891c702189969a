//! Dotted version comparison.

/// Whether `version` is at least `minimum`, comparing `major.minor.patch`
/// numerically. Missing components count as zero; garbage fails.
pub fn min_version_satisfy(version: &str, minimum: &str) -> bool {
    match (parse(version), parse(minimum)) {
        (Some(v), Some(m)) => v >= m,
        _ => false,
    }
}

fn parse(text: &str) -> Option<[u64; 3]> {
    let text = text.trim().trim_start_matches('v');
    let mut parts = [0u64; 3];
    for (slot, raw) in text.split('.').enumerate() {
        if slot >= parts.len() {
            break;
        }
        parts[slot] = raw.parse().ok()?;
    }
    Some(parts)
}
