//! Drive URLs and keys.
//!
//! A drive is addressed by a 32-byte key rendered as 64 hex characters. URLs
//! take the form `hyper://<key>[+<version>][/<path>]`; the bare key is also
//! accepted. Every equivalent spelling resolves to the same lowercase key,
//! which is what the registry is keyed on.

use thiserror::Error;

/// URL scheme for drives.
pub const DRIVE_SCHEME: &str = "hyper://";

/// Length of a hex-encoded drive key.
pub const KEY_HEX_LEN: usize = 64;

/// Why a URL could not be turned into a drive key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("empty drive url")]
    Empty,
    #[error("unsupported scheme in {0:?}")]
    Scheme(String),
    #[error("invalid drive key in {0:?}")]
    Key(String),
    #[error("invalid version in {0:?}")]
    Version(String),
}

/// A parsed drive URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveUrl {
    /// Lowercase hex key.
    pub key: String,
    /// Pinned version, if the URL carried a `+<version>` suffix.
    pub version: Option<u64>,
    /// Path inside the drive, always starting with `/`.
    pub path: String,
}

impl DriveUrl {
    /// Parse a drive URL or bare key.
    pub fn parse(text: &str) -> Result<Self, UrlError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(UrlError::Empty);
        }

        let rest = match trimmed.find("://") {
            Some(idx) => {
                let scheme = &trimmed[..idx + 3];
                if !scheme.eq_ignore_ascii_case(DRIVE_SCHEME) {
                    return Err(UrlError::Scheme(text.to_string()));
                }
                &trimmed[idx + 3..]
            }
            None => trimmed,
        };

        let (host, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let (key, version) = match host.split_once('+') {
            Some((key, version)) => {
                let version = version
                    .parse::<u64>()
                    .map_err(|_| UrlError::Version(text.to_string()))?;
                (key, Some(version))
            }
            None => (host, None),
        };

        if !is_valid_key(key) {
            return Err(UrlError::Key(text.to_string()));
        }

        Ok(Self {
            key: key.to_ascii_lowercase(),
            version,
            path: path.to_string(),
        })
    }

    /// Canonical `hyper://<key>` form, without version or path.
    pub fn origin(&self) -> String {
        drive_url(&self.key)
    }
}

impl std::fmt::Display for DriveUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", DRIVE_SCHEME, self.key)?;
        if let Some(version) = self.version {
            write!(f, "+{}", version)?;
        }
        if self.path != "/" {
            f.write_str(&self.path)?;
        }
        Ok(())
    }
}

/// True if `key` is 64 hex characters (either case).
pub fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_HEX_LEN && key.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Resolve a URL to its registry key.
///
/// With `normalize` the version is dropped so that every spelling of the same
/// drive maps to one key. Without it a `+<version>` suffix is kept.
pub fn resolve_key(url: &str, normalize: bool) -> Result<String, UrlError> {
    let parsed = DriveUrl::parse(url)?;
    match (normalize, parsed.version) {
        (false, Some(version)) => Ok(format!("{}+{}", parsed.key, version)),
        _ => Ok(parsed.key),
    }
}

/// Render the canonical URL for a key.
pub fn drive_url(key: &str) -> String {
    format!("{}{}", DRIVE_SCHEME, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KEY: &str = "9a0b6e5c3f0d4e7a8b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a";

    #[rstest]
    #[case(KEY)]
    #[case("hyper://9a0b6e5c3f0d4e7a8b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a")]
    #[case("hyper://9a0b6e5c3f0d4e7a8b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a/")]
    #[case("HYPER://9A0B6E5C3F0D4E7A8B1C2D3E4F5A6B7C8D9E0F1A2B3C4D5E6F7A8B9C0D1E2F3A")]
    #[case("hyper://9a0b6e5c3f0d4e7a8b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a+42/index.json")]
    #[case("  hyper://9a0b6e5c3f0d4e7a8b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a  ")]
    fn equivalent_forms_resolve_to_one_key(#[case] url: &str) {
        assert_eq!(resolve_key(url, true).unwrap(), KEY);
    }

    #[rstest]
    #[case("")]
    #[case("hyper://")]
    #[case("hyper://not-a-key")]
    #[case("https://9a0b6e5c3f0d4e7a8b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a")]
    #[case("hyper://9a0b6e5c3f0d4e7a8b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a+x")]
    #[case("9a0b6e5c")]
    fn rejects_unresolvable(#[case] url: &str) {
        assert!(resolve_key(url, true).is_err());
    }

    #[test]
    fn keeps_version_without_normalize() {
        let url = format!("hyper://{}+7/foo", KEY);
        assert_eq!(resolve_key(&url, false).unwrap(), format!("{}+7", KEY));
        assert_eq!(resolve_key(&url, true).unwrap(), KEY);
    }

    #[test]
    fn parse_keeps_path() {
        let parsed = DriveUrl::parse(&format!("hyper://{}/a/b.txt", KEY)).unwrap();
        assert_eq!(parsed.path, "/a/b.txt");
        assert_eq!(parsed.version, None);
        assert_eq!(parsed.origin(), drive_url(KEY));
    }

    #[test]
    fn display_round_trips() {
        let text = format!("hyper://{}+3/docs", KEY);
        let parsed = DriveUrl::parse(&text).unwrap();
        assert_eq!(parsed.to_string(), text);
    }
}
