use std::io::BufRead;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that stop a feed parse.
///
/// Only document-level failures surface here. Missing fields, missing items
/// and unknown tags are absorbed into the returned [`Article`] records.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The tokenizer could not continue: bad syntax, mismatched or unclosed
    /// elements, invalid encoding, or text outside any element.
    #[error("Malformed feed document at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// The underlying reader failed.
    #[error("Failed to read feed: {0}")]
    Io(Arc<std::io::Error>),
}

/// One `<item>` of an RSS channel.
///
/// Every field is the verbatim text of the matching child element, or `None`
/// when the item had no such child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Article {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Raw `<pubDate>` text; never parsed as a date.
    pub pub_date: Option<String>,
    pub link: Option<String>,
}

impl Article {
    /// Stable key used to upsert this article into the store.
    ///
    /// The trimmed link when present, otherwise a SHA-256 over the
    /// remaining fields so re-parsing the same item yields the same key.
    pub fn identity(&self) -> String {
        if let Some(link) = self.link.as_deref() {
            let trimmed = link.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }

        let input = format!(
            "{}|{}|{}",
            self.title.as_deref().unwrap_or(""),
            self.pub_date.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or("")
        );
        let hash = Sha256::digest(input.as_bytes());
        format!("{:x}", hash)
    }

    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
            Field::Link => &mut self.link,
        };
        *slot = Some(value);
    }
}

/// The four child elements whose text populates an [`Article`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    PubDate,
    Link,
}

/// What an element name means to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Item,
    Field(Field),
    Other,
}

impl Tag {
    /// Item boundaries match ASCII case-insensitively; field names must
    /// match exactly (`<TITLE>` is not a title).
    fn classify(name: &[u8]) -> Self {
        if name.eq_ignore_ascii_case(b"item") {
            return Tag::Item;
        }
        match name {
            b"title" => Tag::Field(Field::Title),
            b"description" => Tag::Field(Field::Description),
            b"pubDate" => Tag::Field(Field::PubDate),
            b"link" => Tag::Field(Field::Link),
            _ => Tag::Other,
        }
    }
}

/// Text collected for one field, flushed into the current article on the
/// next structural event.
///
/// Adjacent text and CDATA nodes inside the same element arrive as separate
/// tokenizer events; they are joined so `a &amp; <![CDATA[b]]>` reads as a
/// single value.
#[derive(Default)]
struct PendingText {
    field: Option<Field>,
    text: String,
}

impl PendingText {
    fn push(&mut self, field: Field, fragment: &str) {
        self.field = Some(field);
        self.text.push_str(fragment);
    }

    fn flush_into(&mut self, current: &mut Option<Article>) {
        if let Some(field) = self.field.take() {
            let text = std::mem::take(&mut self.text);
            if let Some(article) = current.as_mut() {
                article.set(field, text);
            }
        }
    }
}

/// Parses an RSS document from a buffered reader into its items.
///
/// Records come back in the order their `</item>` appeared. An empty
/// document, or a channel without items, yields an empty vector.
///
/// An `<item>` opened while another is still open replaces it; the earlier
/// record is dropped without being returned.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] when the input is not tokenizable XML
/// (including a document that ends with elements still open) and
/// [`ParseError::Io`] when the reader fails.
pub fn parse<R: BufRead>(input: R) -> Result<Vec<Article>, ParseError> {
    // Text is decoded with the encoding named by the XML declaration or BOM
    let mut reader = Reader::from_reader(input);
    // Whitespace-only field content is kept verbatim
    reader.config_mut().trim_text(false);
    // `<item/>` becomes an open/close pair
    reader.config_mut().expand_empty_elements = true;

    let mut articles = Vec::new();
    let mut current: Option<Article> = None;
    let mut open: Vec<Tag> = Vec::new();
    let mut pending = PendingText::default();
    let mut dropped = 0usize;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| tokenizer_error(&reader, e))?;

        match event {
            Event::Start(e) => {
                pending.flush_into(&mut current);
                let tag = Tag::classify(e.name().as_ref());
                if tag == Tag::Item && current.replace(Article::default()).is_some() {
                    dropped += 1;
                }
                open.push(tag);
            }
            Event::End(e) => {
                pending.flush_into(&mut current);
                open.pop();
                if Tag::classify(e.name().as_ref()) == Tag::Item {
                    if let Some(article) = current.take() {
                        articles.push(article);
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| malformed(&reader, err))?;
                collect_text(&reader, &open, &current, &mut pending, &text)?;
            }
            Event::CData(e) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| malformed(&reader, err))?;
                collect_text(&reader, &open, &current, &mut pending, &text)?;
            }
            Event::Eof => {
                if !open.is_empty() {
                    return Err(malformed(
                        &reader,
                        format!("document ended with {} unclosed element(s)", open.len()),
                    ));
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    if dropped > 0 {
        tracing::debug!(dropped = dropped, "Unclosed <item> records replaced by a later <item>");
    }
    tracing::debug!(items = articles.len(), "Parsed RSS document");

    Ok(articles)
}

/// Parses an RSS document held in memory.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<Article>, ParseError> {
    parse(bytes)
}

/// Parses an RSS document held in a string.
pub fn parse_str(xml: &str) -> Result<Vec<Article>, ParseError> {
    parse(xml.as_bytes())
}

fn collect_text<R>(
    reader: &Reader<R>,
    open: &[Tag],
    current: &Option<Article>,
    pending: &mut PendingText,
    text: &str,
) -> Result<(), ParseError> {
    match open.last() {
        None => {
            if !is_blank(text) {
                return Err(malformed(reader, "text outside of the root element"));
            }
        }
        Some(Tag::Field(field)) if current.is_some() => pending.push(*field, text),
        Some(_) => {}
    }
    Ok(())
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == '\u{feff}')
}

fn tokenizer_error<R>(reader: &Reader<R>, err: quick_xml::Error) -> ParseError {
    match err {
        quick_xml::Error::Io(io) => ParseError::Io(io),
        other => malformed(reader, other),
    }
}

fn malformed<R>(reader: &Reader<R>, err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed {
        position: reader.buffer_position(),
        message: err.to_string(),
    }
}
