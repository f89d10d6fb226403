use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::runtime::ResolvedPaths;

/// Path of the staged file for `key`, refusing names that would leave the
/// pages directory.
pub fn staged_page_path(paths: &ResolvedPaths, key: &str) -> Result<PathBuf> {
    if key.is_empty() || key == "." || key == ".." {
        bail!("invalid staged page name `{key}`");
    }
    if key.contains(['/', '\\', ':']) {
        bail!("staged page name must not contain path separators or ':': `{key}`");
    }
    Ok(paths.pages_dir.join(key))
}

pub fn write_staged_page(paths: &ResolvedPaths, key: &str, content: &str) -> Result<PathBuf> {
    let path = staged_page_path(paths, key)?;
    ensure_parent_dir(&path)?;
    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn read_staged_page(paths: &ResolvedPaths, key: &str) -> Result<String> {
    let path = staged_page_path(paths, key)?;
    fs::read_to_string(&path).with_context(|| format!("failed to read staged page {}", path.display()))
}

/// Names of all staged pages, sorted.
pub fn list_staged_pages(paths: &ResolvedPaths) -> Result<Vec<String>> {
    if !paths.pages_dir.exists() {
        bail!(
            "staged pages directory {} does not exist; run `wikidocs fetch` first",
            paths.pages_dir.display()
        );
    }

    let mut keys = Vec::new();
    for entry in WalkDir::new(&paths.pages_dir).min_depth(1).max_depth(1) {
        let entry = entry
            .with_context(|| format!("failed to scan {}", paths.pages_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        keys.push(name);
    }
    keys.sort();
    Ok(keys)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn staged_pages_round_trip_verbatim() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        let raw = "====== Menu ======\r\n  * [[wiki:start]]\\\\\n";
        let path = write_staged_page(&paths, "wiki_menu", raw).expect("write");
        assert_eq!(path, paths.pages_dir.join("wiki_menu"));
        assert_eq!(read_staged_page(&paths, "wiki_menu").expect("read"), raw);
    }

    #[test]
    fn list_is_sorted_and_skips_hidden_files() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        write_staged_page(&paths, "wiki_start", "b").expect("write");
        write_staged_page(&paths, "team_alpha", "a").expect("write");
        fs::write(paths.pages_dir.join(".DS_Store"), "x").expect("write hidden");
        fs::create_dir_all(paths.pages_dir.join("nested")).expect("nested dir");

        let keys = list_staged_pages(&paths).expect("list");
        assert_eq!(keys, vec!["team_alpha", "wiki_start"]);
    }

    #[test]
    fn list_requires_pages_dir() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        let error = list_staged_pages(&paths).expect_err("must fail");
        assert!(error.to_string().contains("wikidocs fetch"));
    }

    #[test]
    fn rejects_escaping_names() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        assert!(staged_page_path(&paths, "").is_err());
        assert!(staged_page_path(&paths, "..").is_err());
        assert!(staged_page_path(&paths, "wiki:menu").is_err());
        assert!(staged_page_path(&paths, "a/b").is_err());
    }
}
