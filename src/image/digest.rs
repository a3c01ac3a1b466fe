use crate::errors::PullError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Range,
    str::FromStr,
};

/// A digest securely identifying the contents of a manifest or blob
///
/// Registries address content as `<algorithm>:<hex>`. Only `sha256` digests
/// can be checked locally; others are carried through to the server opaquely.
#[derive(Clone)]
pub struct ContentDigest {
    serialized: String,
    format_pos: Range<usize>,
    hex_pos: Range<usize>,
}

impl ContentDigest {
    /// Returns the full `algorithm:hex` string
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Hash some content with `sha256`
    ///
    /// ```
    /// # use layerjail::image::ContentDigest;
    /// let digest = ContentDigest::from_content(b"cat");
    /// assert_eq!(digest.as_str(), "sha256:77af778b51abd4a3c51c5ddd97204a9c3ae614ebccb75a606c3b6865aed6744e");
    /// ```
    pub fn from_content(content_bytes: &[u8]) -> Self {
        let hex = format!("{:x}", Sha256::digest(content_bytes));
        let format_pos = 0.."sha256".len();
        let hex_pos = (format_pos.end + 1)..(format_pos.end + 1 + hex.len());
        ContentDigest {
            serialized: format!("sha256:{}", hex),
            format_pos,
            hex_pos,
        }
    }

    /// Parse a [prim@str] as a [ContentDigest]
    ///
    /// ```
    /// # use layerjail::image::ContentDigest;
    /// let digest = ContentDigest::parse("sha256:00112233445566778899aabbccddeeff").unwrap();
    /// assert_eq!(digest.format_str(), "sha256");
    /// assert_eq!(digest.hex_str(), "00112233445566778899aabbccddeeff")
    /// ```
    pub fn parse(s: &str) -> Result<Self, PullError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", ContentDigest::regex_str())).unwrap();
        }
        match RE.captures(s) {
            None => Err(PullError::InvalidContentDigest(s.to_owned())),
            Some(captures) => Ok(ContentDigest {
                serialized: s.to_owned(),
                format_pos: captures.name("dig_f").unwrap().range(),
                hex_pos: captures.name("dig_h").unwrap().range(),
            }),
        }
    }

    /// The algorithm portion, before the colon
    pub fn format_str(&self) -> &str {
        &self.serialized[self.format_pos.clone()]
    }

    /// The hexadecimal portion, after the colon
    ///
    /// Layer archives are named after this when they are staged on disk.
    pub fn hex_str(&self) -> &str {
        &self.serialized[self.hex_pos.clone()]
    }

    /// Check downloaded content against this digest
    ///
    /// Digests in a format we can't compute are accepted as-is, with a debug
    /// message.
    pub fn verify(&self, content_bytes: &[u8]) -> Result<(), PullError> {
        if self.format_str() != "sha256" {
            log::debug!("not verifying {} digest for {}", self.format_str(), self);
            return Ok(());
        }
        let found = ContentDigest::from_content(content_bytes);
        if &found == self {
            Ok(())
        } else {
            Err(PullError::ContentDigestMismatch {
                expected: self.clone(),
                found,
            })
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<dig>",
            /*  */ "(?P<dig_f>",
            /* -- */ "[a-zA-Z][a-zA-Z0-9]*",
            /* -- */ "(?:[-_+.][a-zA-Z][a-zA-Z0-9]*)*", // separated format components
            /*  */ ")",
            /*  */ ":",
            /*  */ "(?P<dig_h>[a-f0-9]{32,})",
            ")",
        )
    }
}

impl PartialEq for ContentDigest {
    fn eq(&self, other: &Self) -> bool {
        self.serialized == other.serialized
    }
}

impl Eq for ContentDigest {}

impl Hash for ContentDigest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialized.hash(state);
    }
}

impl Ord for ContentDigest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serialized.cmp(&other.serialized)
    }
}

impl PartialOrd for ContentDigest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for ContentDigest {
    type Err = PullError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentDigest::parse(s)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
