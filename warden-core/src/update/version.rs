// warden-core/src/update/version.rs
use semver::Version;

/// Parses a cache directory version suffix. Accepts a leading `v` and
/// zero-fills missing minor/patch components (`1.2` -> `1.2.0`).
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.strip_prefix('v').unwrap_or(raw);
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let mut nums = parts.iter().map(|p| p.parse::<u64>().ok());
    let major = nums.next().flatten()?;
    let minor = nums.next().flatten().unwrap_or(0);
    let patch = nums.next().flatten().unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Splits `name-platform-version` into (`name-platform-`, version) at the
/// first `-` whose suffix parses as a version.
pub fn split_versioned(dir_name: &str) -> Option<(&str, Version)> {
    dir_name
        .match_indices('-')
        .map(|(idx, _)| idx + 1)
        .find_map(|start| {
            parse_lenient(&dir_name[start..]).map(|v| (&dir_name[..start], v))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_forms() {
        assert_eq!(parse_lenient("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_lenient("v2.0"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_lenient("7"), Some(Version::new(7, 0, 0)));
        assert!(parse_lenient("1.2.3-rc.1").unwrap().pre.as_str() == "rc.1");
        assert_eq!(parse_lenient("linux-1.0.0"), None);
        assert_eq!(parse_lenient("1..2"), None);
        assert_eq!(parse_lenient(""), None);
    }

    #[test]
    fn splits_family_from_version() {
        let (prefix, v) = split_versioned("agent-windows-1.2.3").unwrap();
        assert_eq!(prefix, "agent-windows-");
        assert_eq!(v, Version::new(1, 2, 3));

        let (prefix, v) = split_versioned("osquery-ext-linux-5.0.1-beta.2").unwrap();
        assert_eq!(prefix, "osquery-ext-linux-");
        assert_eq!(v.to_string(), "5.0.1-beta.2");

        assert!(split_versioned("bin").is_none());
        assert!(split_versioned("agent-windows-latest").is_none());
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(parse_lenient("10.0.0") > parse_lenient("9.0.0"));
        assert!(parse_lenient("1.10.0") > parse_lenient("1.9.9"));
    }
}
