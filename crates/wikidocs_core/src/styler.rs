use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::gdocs::{
    Dimension, DocRange, DocsRequest, DocumentService, Link, Location, ParagraphStyle, TextStyle,
};
use crate::markup::StyleKind;
use crate::rewriter::{StyleCommand, StyleSink, utf16_len};

/// Index of the first character in a document body.
pub const BODY_START_INDEX: usize = 1;
const LIST_INDENT_PT: f64 = 36.0;
const LIST_HANGING_PT: f64 = 18.0;

/// Applies style commands to one remote document, one `batchUpdate` per
/// command, sleeping a fixed delay after every call.
pub struct RemoteStyler<'a, S: DocumentService + ?Sized> {
    service: &'a mut S,
    document_id: String,
    delay: Duration,
    calls: usize,
}

impl<'a, S: DocumentService + ?Sized> RemoteStyler<'a, S> {
    pub fn new(service: &'a mut S, document_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            service,
            document_id: document_id.into(),
            delay,
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    fn submit(&mut self, requests: &[DocsRequest]) -> Result<()> {
        self.service.batch_update(&self.document_id, requests)?;
        self.calls += 1;
        if !self.delay.is_zero() {
            sleep(self.delay);
        }
        Ok(())
    }
}

impl<S: DocumentService + ?Sized> StyleSink for RemoteStyler<'_, S> {
    fn insert_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.submit(&[DocsRequest::InsertText {
            text: text.to_string(),
            location: Location {
                index: BODY_START_INDEX,
            },
        }])
    }

    fn apply(&mut self, command: &StyleCommand) -> Result<()> {
        let requests = requests_for(command);
        debug!(
            document_id = %self.document_id,
            requests = requests.len(),
            "applying style command"
        );
        self.submit(&requests)
    }
}

/// The `batchUpdate` requests that carry out `command` on the remote body.
pub fn requests_for(command: &StyleCommand) -> Vec<DocsRequest> {
    let start = command.range.start + BODY_START_INDEX;
    let replaced_units = command.replaced_range();
    let replaced = doc_range(
        replaced_units.start + BODY_START_INDEX,
        replaced_units.end + BODY_START_INDEX,
    );

    let mut requests = Vec::new();
    // Bare links keep their text; everything else swaps markup for plain text
    // at exactly this range.
    if !matches!(command.kind, StyleKind::Link { lead: 0, .. }) {
        if !command.range.is_empty() {
            requests.push(DocsRequest::DeleteContentRange {
                range: doc_range(start, command.range.end + BODY_START_INDEX),
            });
        }
        if !command.replacement.is_empty() && command.kind != StyleKind::Divider {
            requests.push(DocsRequest::InsertText {
                text: command.replacement.clone(),
                location: Location { index: start },
            });
        }
    }

    match &command.kind {
        StyleKind::Heading { level } => requests.push(DocsRequest::UpdateParagraphStyle {
            range: replaced,
            paragraph_style: ParagraphStyle {
                named_style_type: Some(format!("HEADING_{level}")),
                ..ParagraphStyle::default()
            },
            fields: "namedStyleType".to_string(),
        }),
        StyleKind::Divider => requests.push(DocsRequest::InsertTable {
            rows: 1,
            columns: 1,
            location: Location { index: start },
        }),
        StyleKind::UnorderedItem { indent } => {
            requests.extend(list_requests(replaced, "BULLET_DISC_CIRCLE_SQUARE", *indent));
        }
        StyleKind::OrderedItem { indent } => {
            requests.extend(list_requests(
                replaced,
                "NUMBERED_DECIMAL_ALPHA_ROMAN",
                *indent,
            ));
        }
        StyleKind::Link { url, title, lead } => {
            let link_start = start + lead;
            requests.push(DocsRequest::UpdateTextStyle {
                range: doc_range(link_start, link_start + utf16_len(title)),
                text_style: TextStyle {
                    link: Link { url: url.clone() },
                },
                fields: "link".to_string(),
            });
        }
    }
    requests
}

fn list_requests(range: DocRange, preset: &str, indent: usize) -> [DocsRequest; 2] {
    let indent_start = LIST_INDENT_PT * indent as f64;
    [
        DocsRequest::CreateParagraphBullets {
            range,
            bullet_preset: preset.to_string(),
        },
        DocsRequest::UpdateParagraphStyle {
            range,
            paragraph_style: ParagraphStyle {
                indent_start: Some(Dimension::pt(indent_start)),
                indent_first_line: Some(Dimension::pt(indent_start - LIST_HANGING_PT)),
                ..ParagraphStyle::default()
            },
            fields: "indentStart,indentFirstLine".to_string(),
        },
    ]
}

fn doc_range(start_index: usize, end_index: usize) -> DocRange {
    DocRange {
        start_index,
        end_index,
    }
}
