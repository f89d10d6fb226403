use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::MigrateError;

pub const GOOGLE_DOCUMENT_MIME: &str = "application/vnd.google-apps.document";
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DOCS_URL: &str = "https://docs.googleapis.com/v1/documents";
const MULTIPART_BOUNDARY: &str = "wikidocs-multipart-boundary-7d1f3a";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocRange {
    pub start_index: usize,
    pub end_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dimension {
    pub magnitude: f64,
    pub unit: &'static str,
}

impl Dimension {
    pub fn pt(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: "PT",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_style_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent_start: Option<Dimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent_first_line: Option<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextStyle {
    pub link: Link,
}

/// One entry of a Docs `batchUpdate` request list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DocsRequest {
    InsertText {
        text: String,
        location: Location,
    },
    DeleteContentRange {
        range: DocRange,
    },
    UpdateParagraphStyle {
        range: DocRange,
        paragraph_style: ParagraphStyle,
        fields: String,
    },
    UpdateTextStyle {
        range: DocRange,
        text_style: TextStyle,
        fields: String,
    },
    CreateParagraphBullets {
        range: DocRange,
        bullet_preset: String,
    },
    InsertTable {
        rows: u32,
        columns: u32,
        location: Location,
    },
}

/// The document service the migration writes into.
pub trait DocumentService {
    fn create_document(&mut self, parent: &str, title: &str) -> Result<String>;
    fn create_file(
        &mut self,
        parent: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String>;
    fn batch_update(&mut self, document_id: &str, requests: &[DocsRequest]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: Option<String>,
}

/// Drive v3 and Docs v1 over a bearer token. Every failure surfaces as
/// [`MigrateError::Remote`]; nothing is retried.
pub struct GoogleClient {
    client: Client,
    access_token: String,
}

impl GoogleClient {
    pub fn new(access_token: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build Google HTTP client")?;
        Ok(Self {
            client,
            access_token: access_token.into(),
        })
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<reqwest::blocking::Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|error| MigrateError::remote(operation, error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(MigrateError::remote(operation, format!("HTTP {status}: {body}")).into());
        }
        Ok(response)
    }

    fn created_id(operation: &str, response: reqwest::blocking::Response) -> Result<String> {
        let created: CreatedFile = response
            .json()
            .map_err(|error| MigrateError::remote(operation, error.to_string()))?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MigrateError::remote(operation, "response carried no file id").into())
    }
}

impl DocumentService for GoogleClient {
    fn create_document(&mut self, parent: &str, title: &str) -> Result<String> {
        let operation = format!("create document {title}");
        let request = self
            .client
            .post(DRIVE_FILES_URL)
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&json!({
                "name": title,
                "parents": [parent],
                "mimeType": GOOGLE_DOCUMENT_MIME,
            }));
        let response = self.send(&operation, request)?;
        Self::created_id(&operation, response)
    }

    fn create_file(
        &mut self,
        parent: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String> {
        let operation = format!("upload file {name}");
        let metadata = json!({ "name": name, "parents": [parent] });
        let body = multipart_related_body(&metadata.to_string(), mime_type, &content);
        let request = self
            .client
            .post(DRIVE_UPLOAD_URL)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body);
        let response = self.send(&operation, request)?;
        Self::created_id(&operation, response)
    }

    fn batch_update(&mut self, document_id: &str, requests: &[DocsRequest]) -> Result<()> {
        debug!(document_id, requests = requests.len(), "docs batchUpdate");
        let operation = format!("batchUpdate {document_id}");
        let request = self
            .client
            .post(format!("{DOCS_URL}/{document_id}:batchUpdate"))
            .json(&json!({ "requests": requests }));
        self.send(&operation, request)?;
        Ok(())
    }
}

/// Body of a Drive `uploadType=multipart` request: JSON metadata followed by
/// the raw file content.
pub fn multipart_related_body(metadata: &str, mime_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}
