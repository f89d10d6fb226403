use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::MigrateConfig;
use crate::error::MigrateError;

const JSONRPC_PATH: &str = "/lib/plugins/jsonrpc/jsonrpc.php";
const FETCH_PATH: &str = "/lib/exe/fetch.php";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttachmentInfo {
    pub id: String,
}

/// The parts of the wiki the migration reads.
pub trait WikiApi {
    fn login(&mut self, user: &str, password: &str) -> Result<()>;
    fn list_pages(&mut self) -> Result<Vec<PageInfo>>;
    fn get_page(&mut self, id: &str) -> Result<String>;
    fn list_attachments(&mut self) -> Result<Vec<AttachmentInfo>>;
    fn get_attachment(&mut self, id: &str) -> Result<Vec<u8>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct DokuWikiClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl DokuWikiClientConfig {
    pub fn from_config(config: &MigrateConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.require_wiki_url()?,
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("DOKUWIKI_HTTP_TIMEOUT_MS", 60_000),
            rate_limit_ms: env_value_u64("DOKUWIKI_RATE_LIMIT_MS", 200),
            max_retries: env_value_usize("DOKUWIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("DOKUWIKI_HTTP_RETRY_DELAY_MS", 500),
        })
    }
}

pub struct DokuWikiClient {
    client: Client,
    config: DokuWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl DokuWikiClient {
    pub fn new(config: DokuWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build DokuWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Call one RPC method. Reads are retried on transient failures; login
    /// is not.
    fn call(&mut self, method: &str, params: Vec<Value>, retryable: bool) -> Result<Value> {
        let body = json!({
            "method": { "methodName": method },
            "params": params,
            "id": "",
            "jsonrpc": "2.0",
        });
        let url = self.endpoint(JSONRPC_PATH);
        let max_retries = if retryable { self.config.max_retries } else { 0 };

        for attempt in 0..=max_retries {
            self.apply_rate_limit();
            debug!(method, attempt, "calling DokuWiki");
            let response = self
                .client
                .post(&url)
                .header("User-Agent", self.config.user_agent.clone())
                .json(&body)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("DokuWiki {method} failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .with_context(|| format!("failed to decode DokuWiki {method} response"))?;
                    if let Some(error) = payload.get("error").filter(|error| !error.is_null()) {
                        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
                        let message = error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error");
                        bail!("DokuWiki {method} error [{code}]: {message}");
                    }
                    return Ok(payload.get("result").cloned().unwrap_or(Value::Null));
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to call DokuWiki {method}"));
                }
            }
        }

        bail!("DokuWiki {method} exhausted retry budget")
    }

    fn fetch_media(&mut self, id: &str) -> Result<Response> {
        let url = self.endpoint(FETCH_PATH);
        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            let response = self
                .client
                .get(&url)
                .header("User-Agent", self.config.user_agent.clone())
                .query(&[("media", id)])
                .send();
            match response {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if attempt < self.config.max_retries && is_retryable_status(status) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    bail!("downloading media {id} failed with HTTP {status}");
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to download media {id}"));
                }
            }
        }
        bail!("downloading media {id} exhausted retry budget")
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl WikiApi for DokuWikiClient {
    fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let result = self.call(
            "dokuwiki.login",
            vec![json!({ "string": user }), json!({ "string": password })],
            false,
        )?;
        if !login_succeeded(&result) {
            return Err(MigrateError::Authentication {
                user: user.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn list_pages(&mut self) -> Result<Vec<PageInfo>> {
        let result = self.call("wiki.getAllPages", Vec::new(), true)?;
        serde_json::from_value(result).context("failed to decode wiki.getAllPages result")
    }

    fn get_page(&mut self, id: &str) -> Result<String> {
        let result = self.call("wiki.getPage", vec![json!({ "string": id })], true)?;
        match result {
            Value::String(content) => Ok(content),
            Value::Null => Ok(String::new()),
            other => bail!("unexpected wiki.getPage result for {id}: {other}"),
        }
    }

    fn list_attachments(&mut self) -> Result<Vec<AttachmentInfo>> {
        let result = self.call(
            "wiki.getAttachments",
            vec![json!({ "string": "" }), json!({ "struct": { "depth": 0 } })],
            true,
        )?;
        serde_json::from_value(result).context("failed to decode wiki.getAttachments result")
    }

    fn get_attachment(&mut self, id: &str) -> Result<Vec<u8>> {
        let response = self.fetch_media(id)?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read media body for {id}"))?;
        Ok(bytes.to_vec())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// The plugin reports login as `true`/`false`, occasionally as `1`/`0`.
fn login_succeeded(result: &Value) -> bool {
    match result {
        Value::Bool(value) => *value,
        Value::Number(number) => number.as_i64().is_some_and(|value| value != 0),
        _ => false,
    }
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_result_accepts_bool_and_number() {
        assert!(login_succeeded(&json!(true)));
        assert!(login_succeeded(&json!(1)));
        assert!(!login_succeeded(&json!(false)));
        assert!(!login_succeeded(&json!(0)));
        assert!(!login_succeeded(&Value::Null));
    }

    #[test]
    fn page_listing_decodes_plugin_shape() {
        let pages: Vec<PageInfo> = serde_json::from_value(json!([
            { "id": "wiki:menu", "perms": 8, "size": 120, "lastModified": {} },
            { "id": "start" }
        ]))
        .expect("decode");
        assert_eq!(pages[0].id, "wiki:menu");
        assert_eq!(pages[1].id, "start");
    }

    #[test]
    fn endpoint_joins_base_without_double_slash() {
        let client = DokuWikiClient::new(DokuWikiClientConfig {
            base_url: "https://intra.example.com/wiki/".to_string(),
            user_agent: "test".to_string(),
            timeout_ms: 1_000,
            rate_limit_ms: 0,
            max_retries: 0,
            retry_delay_ms: 0,
        })
        .expect("client");
        assert_eq!(
            client.endpoint(JSONRPC_PATH),
            "https://intra.example.com/wiki/lib/plugins/jsonrpc/jsonrpc.php"
        );
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }
}
