//! SQLite persistence for parsed articles and user preferences.

mod articles;
mod preferences;
mod schema;
mod types;

pub use preferences::LAST_FEED_URL;
pub use schema::Database;
pub use types::{DatabaseError, StoredArticle};
