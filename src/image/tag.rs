use crate::errors::PullError;
use regex::Regex;
use std::{fmt, str::FromStr};

/// A tag naming one version of an image within its repository
///
/// Tags are up to 128 characters long, including alphanumeric characters and
/// underscores appearing anywhere in the string, and dots or dashes appearing
/// anywhere except the beginning.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Tag {
    serialized: String,
}

static LATEST_STR: &str = "latest";

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Tag]
    pub fn parse(s: &str) -> Result<Self, PullError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Tag::regex_str())).unwrap();
        }
        if RE.is_match(s) {
            Ok(Tag {
                serialized: s.to_owned(),
            })
        } else {
            Err(PullError::InvalidReferenceFormat(s.to_owned()))
        }
    }

    /// The tag used when a reference names none
    pub fn latest() -> Self {
        Tag {
            serialized: LATEST_STR.to_owned(),
        }
    }

    pub fn is_latest(&self) -> bool {
        self.serialized == LATEST_STR
    }

    pub(crate) fn regex_str() -> &'static str {
        "[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,127}"
    }
}

impl Default for Tag {
    fn default() -> Self {
        Tag::latest()
    }
}

impl FromStr for Tag {
    type Err = PullError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::parse(s)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
