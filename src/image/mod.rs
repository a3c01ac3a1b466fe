//! Image references and the identities they resolve to


mod digest;
mod reference;
mod repository;
mod tag;
mod version;

pub use digest::ContentDigest;
pub use reference::ImageReference;
pub use repository::{Repository, RepositoryIter};
pub use tag::Tag;
pub use version::ImageVersion;
