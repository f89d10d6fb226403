use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::resolve::UnresolvedLinkPolicy;

pub const DEFAULT_USER_AGENT: &str = "wikidocs/0.1";
/// The Docs API allows roughly one write per second per user.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrateConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub google: GoogleSection,
    #[serde(default)]
    pub migrate: MigrateSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    /// DokuWiki base URL, e.g. `https://intra.example.com/wiki`.
    pub url: Option<String>,
    pub user: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GoogleSection {
    pub folder_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrateSection {
    pub unresolved_links: Option<UnresolvedLinkPolicy>,
    pub rate_limit_ms: Option<u64>,
}

impl MigrateConfig {
    /// Resolve the wiki base URL: env DOKUWIKI_URL > config.
    pub fn wiki_url(&self) -> Option<String> {
        env_override("DOKUWIKI_URL")
            .or_else(|| self.wiki.url.clone())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Resolve the wiki login user: env DOKUWIKI_USER > config.
    pub fn wiki_user(&self) -> Option<String> {
        env_override("DOKUWIKI_USER").or_else(|| self.wiki.user.clone())
    }

    /// Wiki password, only ever read from the environment.
    pub fn wiki_password(&self) -> Option<String> {
        env_override("DOKUWIKI_PASSWORD")
    }

    /// Resolve user agent: env WIKIDOCS_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKIDOCS_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve the target Drive folder: env GOOGLE_DRIVE_FOLDER_ID > config.
    pub fn folder_id(&self) -> Option<String> {
        env_override("GOOGLE_DRIVE_FOLDER_ID").or_else(|| self.google.folder_id.clone())
    }

    /// OAuth bearer token for Drive and Docs, only read from the environment.
    pub fn access_token(&self) -> Option<String> {
        env_override("GOOGLE_ACCESS_TOKEN")
    }

    /// Resolve link policy: env WIKIDOCS_UNRESOLVED_LINKS > config > degrade.
    pub fn unresolved_links(&self) -> Result<UnresolvedLinkPolicy> {
        if let Some(value) = env_override("WIKIDOCS_UNRESOLVED_LINKS") {
            return value
                .parse()
                .context("invalid WIKIDOCS_UNRESOLVED_LINKS value");
        }
        Ok(self.migrate.unresolved_links.unwrap_or_default())
    }

    /// Resolve delay after each document call: env WIKIDOCS_RATE_LIMIT_MS > config > default.
    pub fn rate_limit_ms(&self) -> Result<u64> {
        if let Some(value) = env_override("WIKIDOCS_RATE_LIMIT_MS") {
            return value
                .parse()
                .with_context(|| format!("invalid WIKIDOCS_RATE_LIMIT_MS value `{value}`"));
        }
        Ok(self.migrate.rate_limit_ms.unwrap_or(DEFAULT_RATE_LIMIT_MS))
    }

    pub fn require_wiki_url(&self) -> Result<String> {
        match self.wiki_url() {
            Some(url) => Ok(url),
            None => bail!("wiki url is not configured (set DOKUWIKI_URL or [wiki].url)"),
        }
    }

    pub fn require_folder_id(&self) -> Result<String> {
        match self.folder_id() {
            Some(id) => Ok(id),
            None => bail!(
                "Drive folder is not configured (set GOOGLE_DRIVE_FOLDER_ID or [google].folder_id)"
            ),
        }
    }
}

/// Load and parse a MigrateConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MigrateConfig> {
    if !config_path.exists() {
        return Ok(MigrateConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: MigrateConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_empty() {
        let config = MigrateConfig::default();
        assert!(config.wiki.url.is_none());
        assert!(config.google.folder_id.is_none());
        assert!(config.migrate.unresolved_links.is_none());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, MigrateConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
url = "https://intra.example.com/wiki/"
user = "migrator"
user_agent = "test-agent/1.0"

[google]
folder_id = "folder-123"

[migrate]
unresolved_links = "fail"
rate_limit_ms = 250
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.wiki.url.as_deref(),
            Some("https://intra.example.com/wiki/")
        );
        assert_eq!(config.wiki.user.as_deref(), Some("migrator"));
        assert_eq!(config.google.folder_id.as_deref(), Some("folder-123"));
        assert_eq!(
            config.migrate.unresolved_links,
            Some(UnresolvedLinkPolicy::Fail)
        );
        assert_eq!(config.migrate.rate_limit_ms, Some(250));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[google]\nfolder_id = \"abc\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.wiki.url.is_none());
        assert_eq!(config.google.folder_id.as_deref(), Some("abc"));
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[wiki\nurl = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_unknown_policy() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[migrate]\nunresolved_links = \"skip\"\n").expect("write");
        assert!(load_config(&config_path).is_err());
    }
}
