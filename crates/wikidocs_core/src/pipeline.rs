use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::dokuwiki::WikiApi;
use crate::gdocs::DocumentService;
use crate::idmap::IdMap;
use crate::media::MediaAsset;
use crate::normalize::normalize;
use crate::resolve::{LinkResolver, UnresolvedLinkPolicy};
use crate::rewriter::{DocumentMirror, plan_document, rewrite_document};
use crate::runtime::ResolvedPaths;
use crate::staging::{list_staged_pages, read_staged_page, write_staged_page};
use crate::styler::RemoteStyler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    LoggedOut,
    LoggedIn,
    PagesEnumerated,
    DocsCreated,
    MediaUploaded,
    ContentWritten,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoggedOut => "logged-out",
            Self::LoggedIn => "logged-in",
            Self::PagesEnumerated => "pages-enumerated",
            Self::DocsCreated => "docs-created",
            Self::MediaUploaded => "media-uploaded",
            Self::ContentWritten => "content-written",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Only write this page (wiki id or normalized key).
    pub page: Option<String>,
    /// Resolve and plan locally without touching the remote documents.
    pub dry_run: bool,
    pub policy: UnresolvedLinkPolicy,
    /// Pause after every document write call.
    pub write_delay: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub pages: usize,
    pub staged: usize,
    /// Wiki ids whose normalized key was already taken by another page.
    pub collisions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateReport {
    pub created: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub documents: usize,
    pub commands: usize,
    pub degraded_links: Vec<String>,
    /// Planned final text per document, filled only for dry runs.
    pub planned: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub reached: Phase,
    pub fetch: FetchReport,
    pub docs: CreateReport,
    pub media: CreateReport,
    pub write: WriteReport,
}

pub fn login<W: WikiApi + ?Sized>(wiki: &mut W, credentials: &Credentials) -> Result<Phase> {
    wiki.login(&credentials.user, &credentials.password)?;
    info!(user = %credentials.user, "logged in to DokuWiki");
    Ok(Phase::LoggedIn)
}

/// Enumerate every page and stage its raw source under the normalized id.
pub fn fetch_pages<W: WikiApi + ?Sized>(wiki: &mut W, paths: &ResolvedPaths) -> Result<FetchReport> {
    let pages = wiki.list_pages()?;
    info!(pages = pages.len(), "enumerated wiki pages");

    let mut report = FetchReport {
        pages: pages.len(),
        ..FetchReport::default()
    };
    let mut seen = BTreeSet::new();
    for page in pages {
        let key = normalize(&page.id);
        if key.is_empty() {
            warn!(page = %page.id, "page id normalizes to nothing; skipping");
            continue;
        }
        if !seen.insert(key.clone()) {
            warn!(page = %page.id, key = %key, "normalized id already staged; skipping");
            report.collisions.push(page.id);
            continue;
        }
        let content = wiki
            .get_page(&page.id)
            .with_context(|| format!("failed to fetch page {}", page.id))?;
        write_staged_page(paths, &key, &content)?;
        report.staged += 1;
    }
    info!(staged = report.staged, "staged wiki pages");
    Ok(report)
}

/// Create one empty document per staged page that has none yet.
pub fn create_docs<D: DocumentService + ?Sized>(
    docs: &mut D,
    paths: &ResolvedPaths,
    folder_id: &str,
) -> Result<CreateReport> {
    let keys = list_staged_pages(paths)?;
    let mut map = IdMap::load(&paths.doc_map_path)?;
    let mut report = CreateReport {
        total: keys.len(),
        ..CreateReport::default()
    };

    for key in keys {
        if map.contains(&key) {
            report.skipped += 1;
            continue;
        }
        let document_id = docs.create_document(folder_id, &key)?;
        map.insert(key.as_str(), document_id)?;
        map.save(&paths.doc_map_path)?;
        report.created += 1;
    }
    map.save(&paths.doc_map_path)?;
    info!(
        created = report.created,
        skipped = report.skipped,
        "documents ready"
    );
    Ok(report)
}

/// Upload every attachment that has no Drive file yet.
///
/// Mime types are derived for the whole listing first, so an unknown
/// extension fails the phase before anything is uploaded.
pub fn upload_media<W, D>(
    wiki: &mut W,
    docs: &mut D,
    paths: &ResolvedPaths,
    folder_id: &str,
) -> Result<CreateReport>
where
    W: WikiApi + ?Sized,
    D: DocumentService + ?Sized,
{
    let attachments = wiki.list_attachments()?;
    let assets = attachments
        .iter()
        .map(|attachment| MediaAsset::from_id(&attachment.id))
        .collect::<Result<Vec<_>>>()?;
    info!(files = assets.len(), "enumerated wiki media");

    let mut map = IdMap::load(&paths.media_map_path)?;
    let mut report = CreateReport {
        total: assets.len(),
        ..CreateReport::default()
    };
    for asset in assets {
        let key = normalize(&asset.id);
        if map.contains(&key) {
            report.skipped += 1;
            continue;
        }
        let content = wiki.get_attachment(&asset.id)?;
        let file_id = docs.create_file(folder_id, &asset.upload_name(), asset.mime_type, content)?;
        map.insert(key, file_id)?;
        map.save(&paths.media_map_path)?;
        report.created += 1;
        info!(uploaded = report.created, media = %asset.id, "uploaded media");
    }
    map.save(&paths.media_map_path)?;
    Ok(report)
}

/// Resolve, insert and style the body of every mapped document, or of the
/// single page selected in `options`.
pub fn write_content<D: DocumentService + ?Sized>(
    docs: &mut D,
    paths: &ResolvedPaths,
    options: &WriteOptions,
) -> Result<WriteReport> {
    if options.dry_run {
        return plan_content(paths, options);
    }
    process_documents(paths, options, |key, document_id, text, report| {
        info!(page = %key, document_id = %document_id, "writing document");
        let mut styler = RemoteStyler::new(&mut *docs, document_id, options.write_delay);
        let mut mirror = DocumentMirror::new(text);
        let commands = rewrite_document(&mut mirror, &mut styler)
            .with_context(|| format!("failed to write document for {key}"))?;
        report.commands += commands.len();
        Ok(())
    })
}

/// Resolve and plan the selected documents locally, recording the final
/// text each would end up with.
pub fn plan_content(paths: &ResolvedPaths, options: &WriteOptions) -> Result<WriteReport> {
    process_documents(paths, options, |key, _document_id, text, report| {
        let (commands, planned) = plan_document(&text)?;
        report.commands += commands.len();
        report.planned.push((key.to_string(), planned));
        Ok(())
    })
}

fn process_documents<F>(paths: &ResolvedPaths, options: &WriteOptions, mut write: F) -> Result<WriteReport>
where
    F: FnMut(&str, &str, String, &mut WriteReport) -> Result<()>,
{
    let documents = IdMap::load_required(&paths.doc_map_path)?;
    let media = IdMap::load(&paths.media_map_path)?;
    let resolver = LinkResolver {
        documents: &documents,
        media: &media,
        policy: options.policy,
    };

    let targets = select_targets(&documents, options.page.as_deref())?;
    let mut report = WriteReport::default();
    for (key, document_id) in targets {
        let raw = read_staged_page(paths, &key)?;
        let resolved = resolver
            .resolve(&raw)
            .with_context(|| format!("failed to resolve links in {key}"))?;
        report.degraded_links.extend(resolved.degraded_links);
        write(&key, &document_id, resolved.text, &mut report)?;
        report.documents += 1;
    }
    Ok(report)
}

fn select_targets(documents: &IdMap, page: Option<&str>) -> Result<Vec<(String, String)>> {
    let Some(page) = page else {
        return Ok(documents
            .iter()
            .map(|(key, id)| (key.to_string(), id.to_string()))
            .collect());
    };
    let key = normalize(page);
    match documents.resolve(&key) {
        Some(id) => Ok(vec![(key, id.to_string())]),
        None => bail!("no document has been created for page `{page}` (key `{key}`)"),
    }
}

/// Run every phase in order. Failures carry the last phase that completed.
pub fn run_all<W, D>(
    wiki: &mut W,
    docs: &mut D,
    paths: &ResolvedPaths,
    credentials: &Credentials,
    folder_id: &str,
    options: &WriteOptions,
) -> Result<RunReport>
where
    W: WikiApi + ?Sized,
    D: DocumentService + ?Sized,
{
    let mut report = RunReport {
        reached: Phase::LoggedOut,
        fetch: FetchReport::default(),
        docs: CreateReport::default(),
        media: CreateReport::default(),
        write: WriteReport::default(),
    };
    run_phases(wiki, docs, paths, credentials, folder_id, options, &mut report)
        .with_context(|| format!("migration stopped after phase {}", report.reached.as_str()))?;
    report.reached = advance(Phase::Done);
    Ok(report)
}

fn run_phases<W, D>(
    wiki: &mut W,
    docs: &mut D,
    paths: &ResolvedPaths,
    credentials: &Credentials,
    folder_id: &str,
    options: &WriteOptions,
    report: &mut RunReport,
) -> Result<()>
where
    W: WikiApi + ?Sized,
    D: DocumentService + ?Sized,
{
    report.reached = login(wiki, credentials)?;
    report.fetch = fetch_pages(wiki, paths)?;
    report.reached = advance(Phase::PagesEnumerated);
    report.docs = create_docs(docs, paths, folder_id)?;
    report.reached = advance(Phase::DocsCreated);
    report.media = upload_media(wiki, docs, paths, folder_id)?;
    report.reached = advance(Phase::MediaUploaded);
    report.write = write_content(docs, paths, options)?;
    report.reached = advance(Phase::ContentWritten);
    Ok(())
}

fn advance(phase: Phase) -> Phase {
    info!(phase = phase.as_str(), "phase complete");
    phase
}
