use std::ops::Range;
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Index footprint of the 1x1 table that stands in for a divider remotely:
/// the paragraph break inserted before the table plus the table, row, cell
/// and cell-paragraph markers.
pub const DIVIDER_FOOTPRINT: usize = 5;

pub const MAX_HEADING_LEVEL: u8 = 6;

/// Formatting applied to one matched construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleKind {
    Heading { level: u8 },
    Divider,
    UnorderedItem { indent: usize },
    OrderedItem { indent: usize },
    /// `lead` is the number of padding characters before `title` in the
    /// replacement text.
    Link { url: String, title: String, lead: usize },
}

/// One style pass. The rewriter runs [`PASS_ORDER`] front to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Heading(u8),
    Divider,
    UnorderedList,
    OrderedList,
    Link,
}

/// Longer heading delimiters go first because shorter ones are substrings of
/// them; links go last so no earlier substitution can cut through a link.
pub const PASS_ORDER: [Pass; 10] = [
    Pass::Heading(1),
    Pass::Heading(2),
    Pass::Heading(3),
    Pass::Heading(4),
    Pass::Heading(5),
    Pass::Heading(6),
    Pass::Divider,
    Pass::UnorderedList,
    Pass::OrderedList,
    Pass::Link,
];

impl Pass {
    pub fn label(self) -> String {
        match self {
            Self::Heading(level) => format!("heading {level}"),
            Self::Divider => "divider".to_string(),
            Self::UnorderedList => "unordered list item".to_string(),
            Self::OrderedList => "ordered list item".to_string(),
            Self::Link => "link".to_string(),
        }
    }

    /// Every occurrence of this pass's construct in `text`, in document order.
    pub fn extract(self, text: &str) -> Vec<MarkupMatch> {
        match self {
            Self::Heading(level) => extract_headings(text, level),
            Self::Divider => extract_dividers(text),
            Self::UnorderedList => extract_list_items(text, unordered_list_regex(), false),
            Self::OrderedList => extract_list_items(text, ordered_list_regex(), true),
            Self::Link => extract_links(text),
        }
    }
}

/// A construct located in a snapshot of the mirror. `span` is a byte range
/// into that snapshot; spans from one extraction never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupMatch {
    pub span: Range<usize>,
    pub replacement: String,
    pub kind: StyleKind,
}

/// Number of `=` on each side of a heading at `level` (level 1 is seven).
pub fn heading_delimiter_len(level: u8) -> usize {
    usize::from(8 - level.clamp(1, MAX_HEADING_LEVEL))
}

pub fn divider_filler() -> String {
    let mut filler = " ".repeat(DIVIDER_FOOTPRINT - 1);
    filler.push('\n');
    filler
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(=+)([^\n]*?)(=+)[ \t]*$").expect("heading pattern is valid")
    })
}

fn divider_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^-{3,}\n").expect("divider pattern is valid"))
}

fn unordered_list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^((?:  )+)\* ?([^\n]+)").expect("unordered list pattern is valid")
    })
}

fn ordered_list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^((?:  )+)- ?([^\n]+)").expect("ordered list pattern is valid")
    })
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"( ?)\[([^\]\n]*)\]\((https?://[^)\s]*)\)|(https?://[^\s\[\]()<>"]+)"#)
            .expect("link pattern is valid")
    })
}

fn extract_headings(text: &str, level: u8) -> Vec<MarkupMatch> {
    let delimiter = heading_delimiter_len(level);
    heading_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let open = caps.get(1)?.as_str();
            let close = caps.get(3)?.as_str();
            if open.len() != delimiter || close.len() != delimiter {
                return None;
            }
            let title = caps.get(2)?.as_str().trim();
            if title.is_empty() {
                return None;
            }
            let whole = caps.get(0)?;
            Some(MarkupMatch {
                span: whole.range(),
                replacement: title.to_string(),
                kind: StyleKind::Heading { level },
            })
        })
        .collect()
}

fn extract_dividers(text: &str) -> Vec<MarkupMatch> {
    divider_regex()
        .find_iter(text)
        .map(|found| MarkupMatch {
            span: found.range(),
            replacement: divider_filler(),
            kind: StyleKind::Divider,
        })
        .collect()
}

fn extract_list_items(text: &str, regex: &Regex, ordered: bool) -> Vec<MarkupMatch> {
    regex
        .captures_iter(text)
        .filter_map(|caps| {
            let indent = caps.get(1)?.as_str().len() / 2;
            let item = caps.get(2)?.as_str();
            let kind = if ordered {
                StyleKind::OrderedItem { indent }
            } else {
                StyleKind::UnorderedItem { indent }
            };
            Some(MarkupMatch {
                span: caps.get(0)?.range(),
                replacement: item.to_string(),
                kind,
            })
        })
        .collect()
}

fn extract_links(text: &str) -> Vec<MarkupMatch> {
    link_regex()
        .captures_iter(text)
        .filter_map(|caps| link_match(&caps))
        .collect()
}

fn link_match(caps: &Captures<'_>) -> Option<MarkupMatch> {
    let whole = caps.get(0)?;
    if let Some(bare) = caps.get(4) {
        let url = bare.as_str().to_string();
        return Some(MarkupMatch {
            span: whole.range(),
            replacement: url.clone(),
            kind: StyleKind::Link {
                title: url.clone(),
                url,
                lead: 0,
            },
        });
    }

    let url = caps.get(3)?.as_str().to_string();
    let title = match caps.get(2).map(|title| title.as_str()) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => url.clone(),
    };
    // Padding keeps list bullets and heading text outside the link run.
    Some(MarkupMatch {
        span: whole.range(),
        replacement: format!(" {title} "),
        kind: StyleKind::Link {
            url,
            title,
            lead: 1,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans<'a>(text: &'a str, matches: &[MarkupMatch]) -> Vec<&'a str> {
        matches.iter().map(|item| &text[item.span.clone()]).collect()
    }

    #[test]
    fn heading_levels_use_descending_delimiter_runs() {
        assert_eq!(heading_delimiter_len(1), 7);
        assert_eq!(heading_delimiter_len(6), 2);
        for level in 1..=MAX_HEADING_LEVEL {
            let marks = "=".repeat(heading_delimiter_len(level));
            let text = format!("intro\n{marks} Title {marks}\nbody\n");
            let matches = Pass::Heading(level).extract(&text);
            assert_eq!(matches.len(), 1, "level {level}");
            assert_eq!(matches[0].replacement, "Title");
            assert_eq!(matches[0].kind, StyleKind::Heading { level });
            assert_eq!(spans(&text, &matches), vec![format!("{marks} Title {marks}")]);
        }
    }

    #[test]
    fn heading_pass_ignores_longer_and_shorter_runs() {
        let text = "======= Top =======\n====== Second ======\n== Small ==\n";
        let level_two = Pass::Heading(2).extract(text);
        assert_eq!(level_two.len(), 1);
        assert_eq!(level_two[0].replacement, "Second");

        let level_one = Pass::Heading(1).extract(text);
        assert_eq!(level_one.len(), 1);
        assert_eq!(level_one[0].replacement, "Top");
    }

    #[test]
    fn heading_requires_text() {
        assert!(Pass::Heading(5).extract("======\n").is_empty());
        assert!(Pass::Heading(6).extract("a == b\n").is_empty());
    }

    #[test]
    fn divider_requires_three_dashes_and_newline() {
        let text = "a\n----\nb\n--\n-------\n----";
        let matches = Pass::Divider.extract(text);
        assert_eq!(spans(text, &matches), vec!["----\n", "-------\n"]);
        assert_eq!(matches[0].replacement.len(), DIVIDER_FOOTPRINT);
        assert!(matches[0].replacement.trim().is_empty());
    }

    #[test]
    fn list_items_count_two_space_groups() {
        let text = "  * first\n    * nested item\n  - one\n      - deep\n* not a list\n";
        let unordered = Pass::UnorderedList.extract(text);
        assert_eq!(unordered.len(), 2);
        assert_eq!(unordered[0].kind, StyleKind::UnorderedItem { indent: 1 });
        assert_eq!(unordered[1].kind, StyleKind::UnorderedItem { indent: 2 });
        assert_eq!(unordered[1].replacement, "nested item");

        let ordered = Pass::OrderedList.extract(text);
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].kind, StyleKind::OrderedItem { indent: 1 });
        assert_eq!(ordered[1].kind, StyleKind::OrderedItem { indent: 3 });
        assert_eq!(ordered[1].replacement, "deep");
    }

    #[test]
    fn markdown_links_are_padded() {
        let text = "see [Guide](https://example.com/guide) now";
        let matches = Pass::Link.extract(text);
        assert_eq!(matches.len(), 1);
        assert_eq!(
            spans(text, &matches),
            vec![" [Guide](https://example.com/guide)"]
        );
        assert_eq!(matches[0].replacement, " Guide ");
        assert_eq!(
            matches[0].kind,
            StyleKind::Link {
                url: "https://example.com/guide".to_string(),
                title: "Guide".to_string(),
                lead: 1,
            }
        );
    }

    #[test]
    fn empty_link_title_falls_back_to_url() {
        let matches = Pass::Link.extract("[](http://a.example)");
        assert_eq!(matches[0].replacement, " http://a.example ");
    }

    #[test]
    fn bare_urls_keep_their_text() {
        let text = "visit https://example.org/x and [T](https://example.org/y)";
        let matches = Pass::Link.extract(text);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].replacement, "https://example.org/x");
        assert!(matches!(matches[0].kind, StyleKind::Link { lead: 0, .. }));
        assert_eq!(matches[1].replacement, " T ");
    }
}
