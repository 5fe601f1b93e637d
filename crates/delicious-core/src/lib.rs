/// Delicious Core
///
/// Pure domain logic shared by the database and HTTP layers:
/// - slug derivation and uniqueness resolution
/// - tag frequency and top-rated aggregation, one stage per function
/// - input normalization (emails, tags, ratings, coordinates)
/// - gravatar URLs and great-circle distance
///
/// Nothing in here touches SQLite or the network. Storage is reached through
/// closures supplied by the caller.

pub mod error;
pub mod geo;
pub mod gravatar;
pub mod ranking;
pub mod slug;
pub mod validate;

pub use error::{Error, Result};
pub use gravatar::gravatar_url;
pub use ranking::{DEFAULT_TOP_LIMIT, tag_frequencies, top_rated};
pub use slug::{SlugPattern, assign, resolve, slugify};
