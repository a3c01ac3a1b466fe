use crate::image::{ContentDigest, Tag};
use std::fmt;

/// What goes after `/manifests/` when asking the registry for an image
///
/// A reference that carries a digest is always pulled by that digest; the
/// tag is only informational in that case.
#[derive(Clone, Eq, PartialEq, Hash)]
pub enum ImageVersion {
    Tag(Tag),
    ContentDigest(ContentDigest),
}

impl ImageVersion {
    pub fn as_str(&self) -> &str {
        match self {
            ImageVersion::Tag(tag) => tag.as_str(),
            ImageVersion::ContentDigest(digest) => digest.as_str(),
        }
    }

    pub fn is_content_digest(&self) -> bool {
        matches!(self, ImageVersion::ContentDigest(_))
    }
}

impl fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
