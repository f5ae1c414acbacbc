//! Atom feed → `Paper` records.

use chrono::{DateTime, Utc};
use curator_types::{collapse_ws, Paper};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("malformed feed XML at byte {position}: {message}")]
    Malformed { position: usize, message: String },
}

/// arXiv reports bad `id_list` lookups as an entry with this id prefix.
const API_ERROR_ID: &str = "http://arxiv.org/api/errors";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Published,
    Summary,
    AuthorName,
}

#[derive(Default)]
struct EntryDraft {
    id: String,
    title: String,
    published: String,
    summary: Option<String>,
    authors: Vec<String>,
    categories: Vec<String>,
}

impl EntryDraft {
    fn finish(self) -> Option<Paper> {
        let id = self.id.trim().to_string();
        if id.is_empty() || id.starts_with(API_ERROR_ID) { return None; }
        let mut paper = Paper::new(id, collapse_ws(&self.title));
        paper.authors = self.authors.iter().map(|a| collapse_ws(a)).filter(|a| !a.is_empty()).collect();
        paper.published_at = DateTime::parse_from_rfc3339(self.published.trim()).ok().map(|d| d.with_timezone(&Utc));
        paper.categories = self.categories.into_iter().collect();
        paper.abstract_text = self.summary.map(|s| collapse_ws(&s)).filter(|s| !s.is_empty());
        Some(paper)
    }
}

fn local_name(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|b| *b == b':') { Some(ix) => &raw[ix + 1..], None => raw }
}

fn category_term(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"term")
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
        .filter(|t| !t.trim().is_empty())
}

pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut out: Vec<Paper> = vec![];

    let mut entry: Option<EntryDraft> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| FeedError::Malformed {
            position: reader.buffer_position(),
            message: e.to_string(),
        })?;
        match event {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if name == b"entry" {
                    entry = Some(EntryDraft::default());
                    in_author = false;
                    field = None;
                } else if let Some(d) = entry.as_mut() {
                    match name.as_slice() {
                        b"author" => in_author = true,
                        b"name" if in_author => field = Some(Field::AuthorName),
                        b"id" => field = Some(Field::Id),
                        b"title" => field = Some(Field::Title),
                        b"published" => field = Some(Field::Published),
                        b"summary" => field = Some(Field::Summary),
                        b"category" => d.categories.extend(category_term(&e)),
                        _ => {}
                    }
                }
                text.clear();
            }
            Event::Empty(e) => {
                if let (b"category", Some(d)) = (local_name(e.name().as_ref()), entry.as_mut()) {
                    d.categories.extend(category_term(&e));
                }
            }
            Event::Text(t) if field.is_some() => {
                let piece = t.unescape().map_err(|e| FeedError::Malformed {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                })?;
                text.push_str(&piece);
            }
            Event::CData(t) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if name == b"entry" {
                    if let Some(p) = entry.take().and_then(EntryDraft::finish) { out.push(p); }
                    field = None;
                } else if name == b"author" {
                    in_author = false;
                } else if let (Some(f), Some(d)) = (field.take(), entry.as_mut()) {
                    let value = std::mem::take(&mut text);
                    match f {
                        Field::Id => d.id = value,
                        Field::Title => d.title = value,
                        Field::Published => d.published = value,
                        Field::Summary => d.summary = Some(value),
                        Field::AuthorName => d.authors.push(value),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
