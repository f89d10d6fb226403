use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use wikidocs_core::config::{MigrateConfig, load_config};
use wikidocs_core::dokuwiki::{DokuWikiClient, DokuWikiClientConfig, WikiApi};
use wikidocs_core::gdocs::GoogleClient;
use wikidocs_core::normalize::{link_target_title, normalize};
use wikidocs_core::pipeline::{
    CreateReport, Credentials, FetchReport, WriteOptions, WriteReport, create_docs, fetch_pages,
    login, plan_content, run_all, upload_media, write_content,
};
use wikidocs_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_layout, normalize_for_display,
    resolve_paths,
};

const GOOGLE_HTTP_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Parser)]
#[command(
    name = "wikidocs",
    version,
    about = "Migrate DokuWiki pages and media into Google Docs"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the .wikidocs state layout and config")]
    Init(InitArgs),
    #[command(about = "Log in to DokuWiki and stage every page locally")]
    Fetch,
    #[command(name = "create-docs", about = "Create one Google Doc per staged page")]
    CreateDocs,
    #[command(name = "upload-media", about = "Upload wiki attachments to Drive")]
    UploadMedia,
    #[command(name = "write-docs", about = "Write and style document bodies")]
    WriteDocs(WriteDocsArgs),
    #[command(about = "Run every phase in order")]
    Run,
    #[command(about = "Print the normalized key of a wiki reference")]
    Normalize(NormalizeArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct WriteDocsArgs {
    #[arg(long, value_name = "ID", help = "Only write this page (wiki id or normalized key)")]
    page: Option<String>,
    #[arg(long, help = "Resolve and plan locally without calling Google")]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct NormalizeArgs {
    reference: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Fetch) => run_fetch(&runtime),
        Some(Commands::CreateDocs) => run_create_docs(&runtime),
        Some(Commands::UploadMedia) => run_upload_media(&runtime),
        Some(Commands::WriteDocs(args)) => run_write_docs(&runtime, args),
        Some(Commands::Run) => run_everything(&runtime),
        Some(Commands::Normalize(NormalizeArgs { reference })) => {
            println!("key: {}", normalize(&reference));
            println!("title: {}", link_target_title(&reference));
            Ok(())
        }
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = std::env::var("RUST_LOG").map_or_else(
        |_| {
            let level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            EnvFilter::new(level)
        },
        EnvFilter::new,
    );

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, args.force)?;

    println!("Initialized wikidocs runtime layout");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("state_dir: {}", normalize_for_display(&paths.state_dir));
    println!("pages_dir: {}", normalize_for_display(&paths.pages_dir));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_fetch(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let mut wiki = logged_in_wiki(&config)?;
    let report = fetch_pages(&mut wiki, &paths)?;

    println!("fetch");
    println!("pages_dir: {}", normalize_for_display(&paths.pages_dir));
    print_fetch_report("pages", &report);
    println!("requests: {}", wiki.request_count());
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_create_docs(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let folder_id = config.require_folder_id()?;
    let mut docs = google_client(&config)?;
    let report = create_docs(&mut docs, &paths, &folder_id)?;

    println!("create-docs");
    println!("doc_map: {}", normalize_for_display(&paths.doc_map_path));
    print_create_report("docs", &report);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_upload_media(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let folder_id = config.require_folder_id()?;
    let mut docs = google_client(&config)?;
    let mut wiki = logged_in_wiki(&config)?;
    let report = upload_media(&mut wiki, &mut docs, &paths, &folder_id)?;

    println!("upload-media");
    println!("media_map: {}", normalize_for_display(&paths.media_map_path));
    print_create_report("media", &report);
    println!("requests: {}", wiki.request_count());
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_write_docs(runtime: &RuntimeOptions, args: WriteDocsArgs) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let options = WriteOptions {
        page: args.page,
        dry_run: args.dry_run,
        policy: config.unresolved_links()?,
        write_delay: Duration::from_millis(config.rate_limit_ms()?),
    };

    let report = if options.dry_run {
        plan_content(&paths, &options)?
    } else {
        let mut docs = google_client(&config)?;
        write_content(&mut docs, &paths, &options)?
    };

    println!("write-docs");
    println!("dry_run: {}", options.dry_run);
    println!("unresolved_links: {}", options.policy.as_str());
    print_write_report("write", &report);
    for (key, text) in &report.planned {
        println!("\n[{key}]\n{text}");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_everything(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;
    let folder_id = config.require_folder_id()?;
    let credentials = wiki_credentials(&config)?;
    let options = WriteOptions {
        page: None,
        dry_run: false,
        policy: config.unresolved_links()?,
        write_delay: Duration::from_millis(config.rate_limit_ms()?),
    };
    let mut docs = google_client(&config)?;
    let mut wiki = DokuWikiClient::new(DokuWikiClientConfig::from_config(&config)?)?;

    let report = run_all(
        &mut wiki,
        &mut docs,
        &paths,
        &credentials,
        &folder_id,
        &options,
    )?;

    println!("run");
    println!("phase: {}", report.reached.as_str());
    print_fetch_report("pages", &report.fetch);
    print_create_report("docs", &report.docs);
    print_create_report("media", &report.media);
    print_write_report("write", &report.write);
    println!("requests: {}", wiki.request_count());
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn logged_in_wiki(config: &MigrateConfig) -> Result<DokuWikiClient> {
    let credentials = wiki_credentials(config)?;
    let mut wiki = DokuWikiClient::new(DokuWikiClientConfig::from_config(config)?)?;
    login(&mut wiki, &credentials)?;
    Ok(wiki)
}

fn wiki_credentials(config: &MigrateConfig) -> Result<Credentials> {
    let user = config
        .wiki_user()
        .context("wiki user is not configured (set DOKUWIKI_USER or [wiki].user)")?;
    let password = config
        .wiki_password()
        .context("DOKUWIKI_PASSWORD is not set")?;
    Ok(Credentials { user, password })
}

fn google_client(config: &MigrateConfig) -> Result<GoogleClient> {
    let token = config
        .access_token()
        .context("GOOGLE_ACCESS_TOKEN is not set")?;
    GoogleClient::new(token, GOOGLE_HTTP_TIMEOUT_MS)
}

fn print_fetch_report(prefix: &str, report: &FetchReport) {
    println!("{prefix}.listed: {}", report.pages);
    println!("{prefix}.staged: {}", report.staged);
    if !report.collisions.is_empty() {
        println!("{prefix}.collisions:");
        for id in &report.collisions {
            println!("  - {id}");
        }
    }
}

fn print_create_report(prefix: &str, report: &CreateReport) {
    println!("{prefix}.total: {}", report.total);
    println!("{prefix}.created: {}", report.created);
    println!("{prefix}.skipped: {}", report.skipped);
}

fn print_write_report(prefix: &str, report: &WriteReport) {
    println!("{prefix}.documents: {}", report.documents);
    println!("{prefix}.style_commands: {}", report.commands);
    if report.degraded_links.is_empty() {
        println!("{prefix}.degraded_links: <none>");
    } else {
        println!("{prefix}.degraded_links:");
        for link in &report.degraded_links {
            println!("  - {link}");
        }
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, MigrateConfig)> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    Ok((paths, config))
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}
