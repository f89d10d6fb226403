use std::borrow::Cow;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{Result, bail};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MigrateError;
use crate::idmap::IdMap;
use crate::normalize::{link_target_title, normalize};

pub const DOCUMENT_URL_PREFIX: &str = "https://docs.google.com/document/d/";
pub const FILE_URL_PREFIX: &str = "https://drive.google.com/file/d/";

/// What to do with a page link whose target has no created document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedLinkPolicy {
    /// Abort the document with a resolution error.
    Fail,
    /// Keep the link title as plain text and log a warning.
    #[default]
    Degrade,
}

impl UnresolvedLinkPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Degrade => "degrade",
        }
    }
}

impl FromStr for UnresolvedLinkPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "degrade" => Ok(Self::Degrade),
            other => bail!("unknown unresolved link policy `{other}` (expected fail or degrade)"),
        }
    }
}

/// Cross-reference tables and policy used while resolving one document.
#[derive(Debug, Clone, Copy)]
pub struct LinkResolver<'a> {
    pub documents: &'a IdMap,
    pub media: &'a IdMap,
    pub policy: UnresolvedLinkPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedText {
    pub text: String,
    /// Page link targets that were degraded to plain text.
    pub degraded_links: Vec<String>,
}

fn page_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\[([^|\]]*)\|?([^\]]*)\]\](?:\\\\)?").expect("page link pattern is valid")
    })
}

fn media_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{([^|}]*)\|?([^}]*)\}\}").expect("media pattern is valid")
    })
}

pub fn markdown_link(title: &str, url: &str) -> String {
    let title = if title.is_empty() { url } else { title };
    format!("[{title}]({url})")
}

pub fn document_url(remote_id: &str) -> String {
    format!("{DOCUMENT_URL_PREFIX}{remote_id}")
}

pub fn file_url(remote_id: &str) -> String {
    format!("{FILE_URL_PREFIX}{remote_id}/view")
}

impl LinkResolver<'_> {
    /// Resolve page links and media embeds in `raw`, then apply the line
    /// cleanups the rest of the pipeline expects.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedText> {
        let source = raw.replace("\r\n", "\n");
        let mut degraded_links = Vec::new();

        let linked = replace_all_fallible(page_link_regex(), &source, |caps| {
            self.resolve_page_link(caps, &mut degraded_links)
        })?;
        let embedded = replace_all_fallible(media_regex(), &linked, |caps| {
            self.resolve_media(caps)
        })?;

        let text = embedded.replace("\n\n\n", "\n").replace("\\\\", "");
        Ok(ResolvedText {
            text,
            degraded_links,
        })
    }

    fn resolve_page_link(&self, caps: &Captures<'_>, degraded: &mut Vec<String>) -> Result<String> {
        let target = caps.get(1).map_or("", |m| m.as_str()).trim();
        // An embed used as a link title shows as its plain display text.
        let title = embeds_as_text(caps.get(2).map_or("", |m| m.as_str()));
        let title = title.trim();

        if target.starts_with("http") {
            return Ok(markdown_link(title, target));
        }

        let page = target.split_once('#').map_or(target, |(page, _)| page);
        let display = if title.is_empty() {
            link_target_title(page)
        } else {
            title
        };
        let key = normalize(page);
        match self.documents.resolve(&key) {
            Some(remote_id) => Ok(markdown_link(display, &document_url(remote_id))),
            None => match self.policy {
                UnresolvedLinkPolicy::Fail => Err(MigrateError::UnresolvedLink {
                    target: target.to_string(),
                    key,
                }
                .into()),
                UnresolvedLinkPolicy::Degrade => {
                    warn!(link = %target, key = %key, "page link has no created document; keeping title");
                    degraded.push(target.to_string());
                    Ok(if display.is_empty() {
                        target.to_string()
                    } else {
                        display.to_string()
                    })
                }
            },
        }
    }

    fn resolve_media(&self, caps: &Captures<'_>) -> Result<String> {
        let target = media_target(caps);
        let key = normalize(target);
        let Some(remote_id) = self.media.resolve(&key) else {
            return Err(MigrateError::UnresolvedMedia {
                target: target.to_string(),
                key,
            }
            .into());
        };
        Ok(markdown_link(media_display(caps), &file_url(remote_id)))
    }
}

/// Media target without its `?width` style parameters.
fn media_target<'t>(caps: &Captures<'t>) -> &'t str {
    let raw_target = caps.get(1).map_or("", |m| m.as_str()).trim();
    raw_target
        .split_once('?')
        .map_or(raw_target, |(target, _)| target)
        .trim()
}

/// Caption of an embed, or the file name when it has none.
fn media_display<'t>(caps: &Captures<'t>) -> &'t str {
    let title = caps.get(2).map_or("", |m| m.as_str()).trim();
    if title.is_empty() {
        link_target_title(media_target(caps))
    } else {
        title
    }
}

fn embeds_as_text(text: &str) -> Cow<'_, str> {
    media_regex().replace_all(text, |caps: &Captures<'_>| media_display(caps).to_string())
}

fn replace_all_fallible<F>(regex: &Regex, text: &str, mut replace: F) -> Result<String>
where
    F: FnMut(&Captures<'_>) -> Result<String>,
{
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for caps in regex.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        output.push_str(&text[cursor..whole.start()]);
        output.push_str(&replace(&caps)?);
        cursor = whole.end();
    }
    output.push_str(&text[cursor..]);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> (IdMap, IdMap) {
        let mut documents = IdMap::new();
        documents.insert("team_page", "doc-42").expect("insert");
        documents.insert("wiki_menu", "doc-1").expect("insert");
        let mut media = IdMap::new();
        media.insert("wiki_logo.png", "file-7").expect("insert");
        (documents, media)
    }

    fn resolver<'a>(
        documents: &'a IdMap,
        media: &'a IdMap,
        policy: UnresolvedLinkPolicy,
    ) -> LinkResolver<'a> {
        LinkResolver {
            documents,
            media,
            policy,
        }
    }

    #[test]
    fn page_link_resolves_to_document_url() {
        let (documents, media) = tables();
        let resolved = resolver(&documents, &media, UnresolvedLinkPolicy::Fail)
            .resolve("go to [[team:page|Title]] now")
            .expect("resolve");
        assert_eq!(
            resolved.text,
            "go to [Title](https://docs.google.com/document/d/doc-42) now"
        );
        assert!(resolved.degraded_links.is_empty());
    }

    #[test]
    fn untitled_page_link_uses_last_segment_and_ignores_fragment() {
        let (documents, media) = tables();
        let resolved = resolver(&documents, &media, UnresolvedLinkPolicy::Fail)
            .resolve("[[:Team:Page#setup]]")
            .expect("resolve");
        assert_eq!(
            resolved.text,
            "[Page](https://docs.google.com/document/d/doc-42)"
        );
    }

    #[test]
    fn external_links_keep_their_url() {
        let (documents, media) = tables();
        let resolved = resolver(&documents, &media, UnresolvedLinkPolicy::Fail)
            .resolve("[[https://example.com|Example]] [[http://bare.example]]")
            .expect("resolve");
        assert_eq!(
            resolved.text,
            "[Example](https://example.com) [http://bare.example](http://bare.example)"
        );
    }

    #[test]
    fn unresolved_page_link_fails_under_fail_policy() {
        let (documents, media) = tables();
        let error = resolver(&documents, &media, UnresolvedLinkPolicy::Fail)
            .resolve("[[team:missing|Gone]]")
            .expect_err("must fail");
        match error.downcast_ref::<MigrateError>() {
            Some(MigrateError::UnresolvedLink { target, key }) => {
                assert_eq!(target, "team:missing");
                assert_eq!(key, "team_missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unresolved_page_link_degrades_to_title() {
        let (documents, media) = tables();
        let resolved = resolver(&documents, &media, UnresolvedLinkPolicy::Degrade)
            .resolve("see [[team:missing|Gone]] and [[team:other]]")
            .expect("resolve");
        assert_eq!(resolved.text, "see Gone and other");
        assert_eq!(resolved.degraded_links, vec!["team:missing", "team:other"]);
    }

    #[test]
    fn media_embed_resolves_and_drops_parameters() {
        let (documents, media) = tables();
        let resolved = resolver(&documents, &media, UnresolvedLinkPolicy::Degrade)
            .resolve("{{wiki:logo.png?200|}} {{ wiki:Logo.png |Company logo}}")
            .expect("resolve");
        assert_eq!(
            resolved.text,
            "[logo.png](https://drive.google.com/file/d/file-7/view) [Company logo](https://drive.google.com/file/d/file-7/view)"
        );
    }

    #[test]
    fn embed_inside_page_link_title_becomes_plain_title() {
        let (documents, media) = tables();
        let resolved = resolver(&documents, &media, UnresolvedLinkPolicy::Fail)
            .resolve("[[wiki:menu|{{wiki:logo.png?64}}]]\n")
            .expect("resolve");
        assert_eq!(
            resolved.text,
            "[logo.png](https://docs.google.com/document/d/doc-1)\n"
        );

        let (commands, text) = crate::rewriter::plan_document(&resolved.text).expect("plan");
        assert_eq!(text, " logo.png \n");
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].kind,
            crate::markup::StyleKind::Link {
                url: "https://docs.google.com/document/d/doc-1".to_string(),
                title: "logo.png".to_string(),
                lead: 1,
            }
        );
    }

    #[test]
    fn missing_media_is_always_fatal() {
        let (documents, media) = tables();
        let error = resolver(&documents, &media, UnresolvedLinkPolicy::Degrade)
            .resolve("{{wiki:absent.pdf}}")
            .expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<MigrateError>(),
            Some(MigrateError::UnresolvedMedia { .. })
        ));
    }

    #[test]
    fn line_cleanups_follow_link_resolution() {
        let (documents, media) = tables();
        let resolved = resolver(&documents, &media, UnresolvedLinkPolicy::Fail)
            .resolve("a\\\\ b\r\n\n\n[[wiki:menu]]\\\\\nc")
            .expect("resolve");
        assert_eq!(
            resolved.text,
            "a b\n[menu](https://docs.google.com/document/d/doc-1)\nc"
        );
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "Fail".parse::<UnresolvedLinkPolicy>().expect("parse"),
            UnresolvedLinkPolicy::Fail
        );
        assert_eq!(
            " degrade ".parse::<UnresolvedLinkPolicy>().expect("parse"),
            UnresolvedLinkPolicy::Degrade
        );
        assert!("ignore".parse::<UnresolvedLinkPolicy>().is_err());
    }
}
