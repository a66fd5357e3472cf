use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::error::{Result, TransportError};

/// A transfer endpoint: either a URI with a scheme or a bare filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local(PathBuf),
    Remote(Url),
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        match Url::parse(raw) {
            // single-letter schemes are Windows drive prefixes such as `C:\data`
            Ok(url) if url.scheme().len() > 1 => Ok(Target::Remote(url)),
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(Target::Local(PathBuf::from(raw)))
            }
            Err(e) => Err(TransportError::InvalidTarget {
                target: raw.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Lower-cased scheme, `None` for bare paths.
    pub fn scheme(&self) -> Option<&str> {
        match self {
            Target::Local(_) => None,
            Target::Remote(url) => Some(url.scheme()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Target::Local(_))
    }
}

/// Append a relative path to a remote location using `/` separators.
pub fn join_remote(base: &str, relative: &Path) -> String {
    let mut joined = base.trim_end_matches('/').to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            joined.push('/');
            joined.push_str(&part.to_string_lossy());
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_paths_are_local() {
        assert_eq!(
            Target::parse("./data.txt").unwrap(),
            Target::Local(PathBuf::from("./data.txt"))
        );
        assert!(Target::parse("/abs/input.bam").unwrap().is_local());
        assert!(Target::parse("relative/dir").unwrap().is_local());
    }

    #[test]
    fn test_drive_letter_is_local() {
        assert!(Target::parse("C:\\data\\reads.fq").unwrap().is_local());
    }

    #[test]
    fn test_scheme_is_lowercased() {
        let target = Target::parse("S3://bucket/key.txt").unwrap();
        assert_eq!(target.scheme(), Some("s3"));
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(
            join_remote("s3://bucket/out/", Path::new("logs/run.log")),
            "s3://bucket/out/logs/run.log"
        );
        assert_eq!(join_remote("/tmp/out", Path::new("a.txt")), "/tmp/out/a.txt");
    }
}
