use crate::errors::PullError;
use regex::Regex;
use std::{fmt, str::FromStr};

/// Path of an image repository on the registry
///
/// Repository paths are slash-separated groups of lowercase alphanumeric
/// segments. Each segment may also contain internal separators: single
/// periods, single underscores, double underscores, or any number of dashes.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Repository {
    serialized: String,
}

/// Iterator over the slash-separated segments of a [Repository]
pub struct RepositoryIter<'a> {
    remaining: Option<&'a str>,
}

impl<'a> Iterator for RepositoryIter<'a> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.remaining?;
        let mut parts = remaining.splitn(2, '/');
        let first = parts.next();
        self.remaining = parts.next();
        first
    }
}

impl Repository {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Repository]
    ///
    /// ```
    /// # use layerjail::image::Repository;
    /// let repo = Repository::parse("bitnami/redis").unwrap();
    /// let parts: Vec<&str> = repo.iter().collect();
    /// assert_eq!(parts, vec!["bitnami", "redis"])
    /// ```
    pub fn parse(s: &str) -> Result<Self, PullError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Repository::regex_str())).unwrap();
        }
        if RE.is_match(s) {
            Ok(Repository {
                serialized: s.to_owned(),
            })
        } else {
            Err(PullError::InvalidReferenceFormat(s.to_owned()))
        }
    }

    pub fn iter(&self) -> RepositoryIter<'_> {
        RepositoryIter {
            remaining: Some(&self.serialized),
        }
    }

    /// Does this path have a single segment, like `busybox`?
    pub fn is_single_segment(&self) -> bool {
        !self.serialized.contains('/')
    }

    /// Join two repository paths with a slash
    pub fn join(&self, other: &Self) -> Self {
        Repository {
            serialized: format!("{}/{}", self.serialized, other.serialized),
        }
    }

    /// Remove a leading path segment, if this repository starts with it
    pub(crate) fn strip_first_segment(&self, segment: &str) -> Option<Self> {
        let rest = self.serialized.strip_prefix(segment)?.strip_prefix('/')?;
        Some(Repository {
            serialized: rest.to_owned(),
        })
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*", // first segment
            "(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*", // more segments
        )
    }
}

impl FromStr for Repository {
    type Err = PullError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Repository::parse(s)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
