use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The backing store could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A unique column rejected the write. Slug collisions land here when two
    /// creations race; the caller re-resolves and retries.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("not found")]
    NotFound,

    #[error("name {0:?} has no characters usable in a slug")]
    InvalidName(String),

    #[error("rating {0} is outside 1-5")]
    InvalidRating(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
