use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use secrecy::SecretString;
use serde::Deserialize;

use crate::client::cookie_value;
use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected upload with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed upload response: {0}")]
    Malformed(String),
}

/// Creates a session on the server from a document and returns its id.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    async fn upload(&self, file_name: String, contents: Vec<u8>) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct CreatedSession {
    session_id: String,
    #[allow(dead_code)]
    document_id: Option<String>,
    #[allow(dead_code)]
    user_id: Option<String>,
}

/// Posts the document as `multipart/form-data` to the sessions endpoint.
pub struct HttpUploader {
    client: reqwest::Client,
    sessions_url: String,
    session_cookie: Option<SecretString>,
}

impl HttpUploader {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            sessions_url: config.sessions_url(),
            session_cookie: config.session_cookie().cloned(),
        }
    }
}

#[async_trait]
impl DocumentUploader for HttpUploader {
    async fn upload(&self, file_name: String, contents: Vec<u8>) -> Result<String, UploadError> {
        let mime = content_type(&file_name);
        tracing::info!(
            "uploading {:?} ({} bytes, {}) to {}",
            file_name,
            contents.len(),
            mime,
            self.sessions_url
        );
        let part = Part::bytes(contents).file_name(file_name).mime_str(mime)?;
        let form = Form::new().part("file", part);

        let mut request = self.client.post(&self.sessions_url).multipart(form);
        if let Some(cookie) = self.session_cookie.as_ref() {
            request = request.header(reqwest::header::COOKIE, cookie_value(cookie));
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        parse_created(&body)
    }
}

fn parse_created(body: &str) -> Result<String, UploadError> {
    let created: CreatedSession =
        serde_json::from_str(body).map_err(|e| UploadError::Malformed(e.to_string()))?;
    if created.session_id.is_empty() {
        return Err(UploadError::Malformed("empty session_id".to_string()));
    }
    Ok(created.session_id)
}

fn content_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("md") => "text/markdown",
        Some("txt") | None => "text/plain",
        _ => "application/octet-stream",
    }
}
