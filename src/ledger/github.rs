use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::GithubSettings;
use crate::error::StoreError;

use super::store::{Revision, Snapshot, VersionedStore};

/// Ledger storage in a GitHub repository through the contents API. The blob
/// SHA of the file is the revision token.
#[derive(Clone, Debug)]
pub struct GithubStore {
    client: Client,
    settings: GithubSettings,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentResponse {
    content: PutContentItem,
}

#[derive(Debug, Deserialize)]
struct PutContentItem {
    sha: String,
}

impl GithubStore {
    pub fn new(client: Client, settings: GithubSettings) -> Self {
        Self { client, settings }
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.owner,
            self.settings.repo
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.settings.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Files over 1 MB come back without inline content; fetch the blob.
    async fn read_blob(&self, sha: &str) -> Result<String, StoreError> {
        let url = format!("{}/git/blobs/{sha}", self.repo_url());
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = ensure_success(response).await?;
        let blob: BlobResponse = response.json().await?;
        decode_content(&blob.content)
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let url = format!("{}/contents/{path}", self.repo_url());
        let body = PutContentRequest {
            message,
            content: STANDARD.encode(content),
            branch: &self.settings.branch,
            sha: expected.map(|revision| revision.0.as_str()),
        };
        let response = self
            .authorized(self.client.put(url))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT => Err(StoreError::Conflict {
                path: path.to_string(),
            }),
            // Creating over an existing file is rejected as unprocessable.
            StatusCode::UNPROCESSABLE_ENTITY if expected.is_none() => Err(StoreError::Conflict {
                path: path.to_string(),
            }),
            _ => {
                let response = ensure_success(response).await?;
                let created: PutContentResponse = response.json().await?;
                Ok(Revision(created.content.sha))
            }
        }
    }
}

#[async_trait]
impl VersionedStore for GithubStore {
    async fn read(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
        let url = format!("{}/contents/{path}", self.repo_url());
        let response = self
            .authorized(self.client.get(url))
            .query(&[("ref", self.settings.branch.as_str())])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let item: ContentResponse = response.json().await?;

        let content = if item.encoding == "base64" && !item.content.is_empty() {
            decode_content(&item.content)?
        } else {
            self.read_blob(&item.sha).await?
        };
        Ok(Some(Snapshot {
            content,
            revision: Revision(item.sha),
        }))
    }

    async fn create(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<Revision, StoreError> {
        self.put(path, content, message, None).await
    }

    async fn update(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        self.put(path, content, message, Some(expected)).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

fn decode_content(encoded: &str) -> Result<String, StoreError> {
    // The API wraps base64 payloads at 60 columns.
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|err| StoreError::Decode(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| StoreError::Decode(err.to_string()))
}
