use crate::{
    errors::PullError,
    image::{ContentDigest, ImageVersion, Repository, Tag},
};
use std::{fmt, str::FromStr};

/// Parsed `name[:tag][@digest]` image reference
///
/// The name is a [Repository] path on the default registry. When no tag is
/// given the reference means `latest`. References are immutable once parsed.
///
/// ```
/// # use layerjail::ImageReference;
/// let image: ImageReference = "busybox".parse().unwrap();
/// assert_eq!(image.name().as_str(), "busybox");
/// assert_eq!(image.tag().as_str(), "latest");
/// ```
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ImageReference {
    name: Repository,
    tag: Tag,
    explicit_tag: bool,
    digest: Option<ContentDigest>,
}

impl ImageReference {
    pub fn parse(s: &str) -> Result<Self, PullError> {
        let (name_and_tag, digest) = match s.find('@') {
            Some(at) => (&s[..at], Some(ContentDigest::parse(&s[at + 1..])?)),
            None => (s, None),
        };
        let mut parts = name_and_tag.splitn(2, ':');
        let name = parts.next().unwrap_or_default();
        let tag = parts.next();
        Ok(ImageReference {
            name: name
                .parse()
                .map_err(|_| PullError::InvalidReferenceFormat(s.to_owned()))?,
            tag: match tag {
                None => Tag::latest(),
                Some(tag) => tag
                    .parse()
                    .map_err(|_| PullError::InvalidReferenceFormat(s.to_owned()))?,
            },
            explicit_tag: tag.is_some(),
            digest,
        })
    }

    pub fn name(&self) -> &Repository {
        &self.name
    }

    /// The requested tag, which is `latest` if the reference had none
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn content_digest(&self) -> Option<&ContentDigest> {
        self.digest.as_ref()
    }

    /// The most specific version available: the digest if there is one,
    /// otherwise the tag
    pub fn version(&self) -> ImageVersion {
        match &self.digest {
            Some(digest) => ImageVersion::ContentDigest(digest.clone()),
            None => ImageVersion::Tag(self.tag.clone()),
        }
    }
}

impl FromStr for ImageReference {
    type Err = PullError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageReference::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.explicit_tag || self.digest.is_none() {
            write!(f, ":{}", self.tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageReference({})", self)
    }
}
