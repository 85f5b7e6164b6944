//! Semantic version comparison.

use semver::Version;

use super::error::{ArtifactError, Result};

/// Parses a semantic version, ignoring a single leading `v`.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    Version::parse(bare).map_err(|source| ArtifactError::Parse {
        version: input.to_string(),
        source,
    })
}

/// Returns true if `a` is strictly greater than `b` under semver ordering.
///
/// # Errors
///
/// Returns [`ArtifactError::Parse`] if either string is not a valid version.
pub fn is_greater(a: &str, b: &str) -> Result<bool> {
    Ok(parse_version(a)? > parse_version(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nightly_prerelease_ordering() {
        assert!(is_greater("v0.4.0-nightly-20230807", "0.4.0-nightly-20230802").unwrap());
        assert!(!is_greater("v0.3.2", "v0.4.0-nightly-20230802").unwrap());
    }

    #[test]
    fn test_equal_is_not_greater() {
        assert!(!is_greater("v1.2.3", "1.2.3").unwrap());
    }

    #[test]
    fn test_release_beats_prerelease() {
        assert!(is_greater("0.4.0", "0.4.0-nightly-20230802").unwrap());
    }

    #[test]
    fn test_invalid_version() {
        let err = is_greater("not-a-version", "1.0.0").unwrap_err();
        assert!(matches!(err, ArtifactError::Parse { ref version, .. } if version == "not-a-version"));
        assert!(is_greater("1.0.0", "1.0").is_err());
    }
}
