use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_DIR_NAME: &str = ".wikidocs";
pub const DOC_MAP_FILENAME: &str = "doc-ids.json";
pub const MEDIA_MAP_FILENAME: &str = "media-ids.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

/// Where a migration run keeps its staged pages and id maps.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub pages_dir: PathBuf,
    pub doc_map_path: PathBuf,
    pub media_map_path: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Layout rooted at `project_root` with every path at its default.
    pub fn under(project_root: &Path) -> Self {
        let state_dir = project_root.join(STATE_DIR_NAME);
        Self {
            project_root: project_root.to_path_buf(),
            pages_dir: state_dir.join("pages"),
            doc_map_path: state_dir.join(DOC_MAP_FILENAME),
            media_map_path: state_dir.join(MEDIA_MAP_FILENAME),
            config_path: state_dir.join("config.toml"),
            state_dir,
            root_source: ValueSource::Flag,
            config_source: ValueSource::Default,
        }
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\npages_dir={}\ndoc_map={}\nmedia_map={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.pages_dir),
            normalize_for_display(&self.doc_map_path),
            normalize_for_display(&self.media_map_path),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let mut paths = ResolvedPaths::under(&project_root);
    paths.root_source = root_source;

    if let Some(path) = overrides.config.as_deref() {
        paths.config_path = absolutize(path, &project_root);
        paths.config_source = ValueSource::Flag;
    } else if let Some(value) = lookup_env("WIKIDOCS_CONFIG") {
        paths.config_path = absolutize(Path::new(value.trim()), &project_root);
        paths.config_source = ValueSource::Env;
    }

    Ok(paths)
}

/// Create the state layout and a commented config file.
pub fn init_layout(paths: &ResolvedPaths, force: bool) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [&paths.state_dir, &paths.pages_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }

    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), force)?;
    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

pub fn render_default_config() -> String {
    "# wikidocs migration configuration (materialized by `wikidocs init`)\n# Secrets come from the environment: DOKUWIKI_PASSWORD, GOOGLE_ACCESS_TOKEN.\n\n[wiki]\n# url = \"https://intra.example.com/wiki\"\n# user = \"migrator\"\n\n[google]\n# folder_id = \"0AbCdEfGhIjKlMnOp\"\n\n[migrate]\n# fail | degrade\nunresolved_links = \"degrade\"\nrate_limit_ms = 1000\n".to_string()
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = lookup_env("WIKIDOCS_PROJECT_ROOT") {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }

    match detect_project_root_heuristic(&context.cwd) {
        Some(root) => (root, ValueSource::Heuristic),
        None => (context.cwd.clone(), ValueSource::Default),
    }
}

fn detect_project_root_heuristic(cwd: &Path) -> Option<PathBuf> {
    let mut seen = HashSet::new();
    for candidate in cwd.ancestors() {
        if !seen.insert(normalize_for_display(candidate)) {
            continue;
        }
        if candidate.join(STATE_DIR_NAME).is_dir() {
            return Some(candidate.to_path_buf());
        }
    }
    None
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::tempdir;

    fn context(cwd: &Path) -> ResolutionContext {
        ResolutionContext {
            cwd: cwd.to_path_buf(),
        }
    }

    #[test]
    fn flag_overrides_env_and_heuristic() {
        let temp = tempdir().expect("tempdir");
        let flagged = temp.path().join("flagged");
        let overrides = PathOverrides {
            project_root: Some(flagged.clone()),
            config: None,
        };
        let paths = resolve_paths_with_lookup(&context(temp.path()), &overrides, |_| {
            Some("/from/env".to_string())
        })
        .expect("resolve");
        assert_eq!(paths.project_root, flagged);
        assert_eq!(paths.root_source, ValueSource::Flag);
    }

    #[test]
    fn env_root_and_config_are_used() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("envroot");
        let root_value = root.to_string_lossy().to_string();
        let paths = resolve_paths_with_lookup(
            &context(temp.path()),
            &PathOverrides::default(),
            |key| match key {
                "WIKIDOCS_PROJECT_ROOT" => Some(root_value.clone()),
                "WIKIDOCS_CONFIG" => Some("custom.toml".to_string()),
                _ => None,
            },
        )
        .expect("resolve");
        assert_eq!(paths.project_root, root);
        assert_eq!(paths.root_source, ValueSource::Env);
        assert_eq!(paths.config_path, root.join("custom.toml"));
        assert_eq!(paths.config_source, ValueSource::Env);
    }

    #[test]
    fn heuristic_finds_ancestor_with_state_dir() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        let nested = root.join("a").join("b");
        fs::create_dir_all(root.join(STATE_DIR_NAME)).expect("state dir");
        fs::create_dir_all(&nested).expect("nested");

        let paths = resolve_paths_with_lookup(&context(&nested), &PathOverrides::default(), |_| {
            None
        })
        .expect("resolve");
        assert_eq!(paths.project_root, root);
        assert_eq!(paths.root_source, ValueSource::Heuristic);
        assert_eq!(paths.doc_map_path, root.join(STATE_DIR_NAME).join(DOC_MAP_FILENAME));
    }

    #[test]
    fn init_layout_creates_dirs_and_loadable_config() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        let report = init_layout(&paths, false).expect("init");
        assert!(report.wrote_config);
        assert!(paths.pages_dir.is_dir());

        let config = load_config(&paths.config_path).expect("config parses");
        assert_eq!(config.migrate.rate_limit_ms, Some(1000));

        let again = init_layout(&paths, false).expect("init again");
        assert!(!again.wrote_config);
        assert!(again.created_dirs.is_empty());
    }
}
