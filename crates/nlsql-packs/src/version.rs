/// Sort key for a system-pack version directory name: `v?X.Y.Z` sorts as
/// the numeric triple; anything else sorts below every numeric version,
/// ordered lexically among themselves.
pub fn semver_key(name: &str) -> (u64, u64, u64, String) {
    let stripped = name.strip_prefix('v').unwrap_or(name);
    let parts: Vec<&str> = stripped.split('.').collect();
    if parts.len() == 3 {
        if let (Ok(major), Ok(minor), Ok(patch)) = (
            parts[0].parse::<u64>(),
            parts[1].parse::<u64>(),
            parts[2].parse::<u64>(),
        ) {
            return (major, minor, patch, String::new());
        }
    }
    (0, 0, 0, name.to_string())
}

/// Picks the highest-sorting directory name among `candidates`.
pub fn latest_version<'a>(candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates.max_by_key(|name| semver_key(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_versions_sort_by_triple() {
        let versions = vec!["v1.2.0", "v1.10.0", "v1.9.5"];
        assert_eq!(latest_version(versions.into_iter()), Some("v1.10.0"));
    }

    #[test]
    fn non_matching_names_sort_below_numeric_versions() {
        let versions = vec!["latest", "v2.0.0", "staging"];
        assert_eq!(latest_version(versions.into_iter()), Some("v2.0.0"));
    }

    #[test]
    fn among_non_matching_names_lexical_order_applies() {
        let versions = vec!["beta", "alpha"];
        assert_eq!(latest_version(versions.into_iter()), Some("beta"));
    }

    #[test]
    fn bare_numeric_triple_without_v_prefix_parses() {
        assert_eq!(semver_key("1.2.3"), (1, 2, 3, String::new()));
    }
}
