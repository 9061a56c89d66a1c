//! RSS feed retrieval and parsing.
//!
//! - **Parsing**: turn an RSS 2.0 document into [`Article`] records, one per
//!   `<item>`, in document order
//! - **Fetching**: HTTP retrieval with retry, timeout and a body size cap
//!
//! # Example
//!
//! ```
//! use feedpull::feed::parse_str;
//!
//! let xml = "<rss><channel><item><title>Hello</title></item></channel></rss>";
//! let articles = parse_str(xml).unwrap();
//! assert_eq!(articles[0].title.as_deref(), Some("Hello"));
//! assert_eq!(articles[0].link, None);
//! ```

mod fetcher;
mod parser;

pub use fetcher::{fetch_articles, fetch_feed, FetchError, FetchOptions};
pub use parser::{parse, parse_bytes, parse_str, Article, ParseError};
