//! Streaming RSS 2.0 item parser, with the fetch, storage and configuration
//! pieces used by the `feedpull` command line.
//!
//! The core entry point is [`feed::parse`], which turns any buffered reader
//! over an RSS document into a vector of [`feed::Article`] records.

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
