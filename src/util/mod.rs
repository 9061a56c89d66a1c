//! Utility functions shared by the command line.
//!
//! - **URL validation**: which feed URLs may be fetched
//! - **Text processing**: turning untrusted feed text into safe, width-limited lines

mod text;
mod url_validator;

pub use text::{single_line, truncate_to_width};
pub use url_validator::{validate_feed_url, UrlValidationError};
