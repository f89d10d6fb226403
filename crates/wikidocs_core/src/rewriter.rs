use std::ops::Range;

use anyhow::Result;
use tracing::{debug, info};

use crate::markup::{MarkupMatch, PASS_ORDER, Pass, StyleKind};

/// Formatting instruction against a character range of the remote document.
///
/// `range` is in UTF-16 code units relative to the start of the mirror, and
/// `replacement` is the plain text that takes the place of that range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleCommand {
    pub kind: StyleKind,
    pub range: Range<usize>,
    pub replacement: String,
}

impl StyleCommand {
    /// Range the replacement text occupies once the command has been applied.
    pub fn replaced_range(&self) -> Range<usize> {
        self.range.start..self.range.start + utf16_len(&self.replacement)
    }
}

/// Receiver of the remote edits a document rewrite produces. Calls arrive
/// strictly in order and each must complete before the next range is taken.
pub trait StyleSink {
    fn insert_text(&mut self, text: &str) -> Result<()>;
    fn apply(&mut self, command: &StyleCommand) -> Result<()>;
}

/// Sink that only records what it receives.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub inserted: Vec<String>,
    pub commands: Vec<StyleCommand>,
}

impl StyleSink for RecordingSink {
    fn insert_text(&mut self, text: &str) -> Result<()> {
        self.inserted.push(text.to_string());
        Ok(())
    }

    fn apply(&mut self, command: &StyleCommand) -> Result<()> {
        self.commands.push(command.clone());
        Ok(())
    }
}

/// Local copy of one document's text, kept in lockstep with the remote body.
///
/// Ranges are taken from the rebuilt prefix at the moment each command is
/// issued, so repeated text never confuses one occurrence with another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMirror {
    text: String,
}

impl DocumentMirror {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Run one pass: emit a command per match and commit its substitution.
    /// Returns the commands in the order they were issued.
    pub fn run_pass<S: StyleSink + ?Sized>(
        &mut self,
        pass: Pass,
        sink: &mut S,
    ) -> Result<Vec<StyleCommand>> {
        let matches = pass.extract(&self.text);
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let commands = self.commit_matches(&matches, sink)?;
        info!(pass = %pass.label(), count = commands.len(), "applied style pass");
        Ok(commands)
    }

    fn commit_matches<S: StyleSink + ?Sized>(
        &mut self,
        matches: &[MarkupMatch],
        sink: &mut S,
    ) -> Result<Vec<StyleCommand>> {
        let snapshot = self.text.as_str();
        let mut rebuilt = String::with_capacity(snapshot.len());
        let mut rebuilt_units = 0usize;
        let mut cursor = 0usize;
        let mut commands = Vec::with_capacity(matches.len());

        for item in matches {
            let gap = &snapshot[cursor..item.span.start];
            rebuilt.push_str(gap);
            rebuilt_units += utf16_len(gap);

            // Live text at this instant is `rebuilt + snapshot[item.span.start..]`.
            let matched = &snapshot[item.span.clone()];
            let command = StyleCommand {
                kind: item.kind.clone(),
                range: rebuilt_units..rebuilt_units + utf16_len(matched),
                replacement: item.replacement.clone(),
            };
            debug!(range = ?command.range, matched, "issuing style command");
            sink.apply(&command)?;

            rebuilt.push_str(&item.replacement);
            rebuilt_units += utf16_len(&item.replacement);
            cursor = item.span.end;
            commands.push(command);
        }
        rebuilt.push_str(&snapshot[cursor..]);

        self.text = rebuilt;
        Ok(commands)
    }
}

/// Write `mirror` to the sink and run every style pass in order.
pub fn rewrite_document<S: StyleSink + ?Sized>(
    mirror: &mut DocumentMirror,
    sink: &mut S,
) -> Result<Vec<StyleCommand>> {
    sink.insert_text(mirror.as_str())?;
    let mut commands = Vec::new();
    for pass in PASS_ORDER {
        commands.extend(mirror.run_pass(pass, sink)?);
    }
    Ok(commands)
}

/// Dry run: the commands and final text a rewrite of `text` would produce.
pub fn plan_document(text: &str) -> Result<(Vec<StyleCommand>, String)> {
    let mut mirror = DocumentMirror::new(text);
    let mut sink = RecordingSink::default();
    let commands = rewrite_document(&mut mirror, &mut sink)?;
    Ok((commands, mirror.into_string()))
}

pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}
