//! Downloads the capture metadata of the NYPL cigarette card collections,
//! page by page, into the files the broadcast job reads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, Url, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::configuration::Settings;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("A NYPL API token is required (set NYPL_TOKEN)")]
    MissingToken,
    #[error("invalid NYPL api url: {0}")]
    Url(String),
    #[error("Request for page {page} of collection {collection} failed")]
    Request {
        collection: String,
        page: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected response structure for page {page} of collection {collection}")]
    UnexpectedShape { collection: String, page: u32 },
    #[error("Failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize the metadata")]
    Serialize(#[from] serde_json::Error),
    #[error("No items were downloaded from any collection")]
    NothingDownloaded,
}

/// One page of a collection listing.
#[derive(Debug)]
pub struct CapturePage {
    pub captures: Vec<Value>,
    pub total_pages: u32,
}

pub struct NyplClient {
    http_client: Client,
    base_url: Url,
    token: SecretString,
}

impl NyplClient {
    pub fn new(
        base_url: &str,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        // A trailing slash keeps `join` from dropping the last path segment.
        let base_url = format!("{}/", base_url.trim_end_matches('/'));
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: Url::parse(&base_url).map_err(|e| DownloadError::Url(e.to_string()))?,
            token,
        })
    }

    #[tracing::instrument(name = "Fetching a collection page", skip(self))]
    pub async fn fetch_page(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CapturePage, DownloadError> {
        let url = self
            .base_url
            .join(&format!("items/{collection}"))
            .map_err(|e| DownloadError::Url(e.to_string()))?;
        let request_failed = |source| DownloadError::Request {
            collection: collection.to_owned(),
            page,
            source,
        };

        let document: Value = self
            .http_client
            .get(url)
            .header(
                AUTHORIZATION,
                format!(r#"Token token="{}""#, self.token.expose_secret()),
            )
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await
            .map_err(request_failed)?
            .error_for_status()
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)?;

        let captures = document
            .pointer("/nyplAPI/response/capture")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| DownloadError::UnexpectedShape {
                collection: collection.to_owned(),
                page,
            })?;

        Ok(CapturePage {
            captures,
            total_pages: total_pages(&document),
        })
    }
}

/// The API reports `totalPages` either as a number or as a string.
fn total_pages(document: &Value) -> u32 {
    match document.pointer("/nyplAPI/request/totalPages") {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or(1)
}

/// Walks the pages of one collection until an empty page, the last page, or
/// a failed request. A failure keeps what was fetched before it.
#[tracing::instrument(name = "Downloading a collection", skip(client, page_delay))]
pub async fn download_collection(
    client: &NyplClient,
    collection: &str,
    per_page: u32,
    page_delay: Duration,
) -> Vec<Value> {
    let mut captures = vec![];
    let mut page = 1;
    loop {
        let fetched = match client.fetch_page(collection, page, per_page).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Stopping the download of this collection"
                );
                break;
            }
        };
        if fetched.captures.is_empty() {
            tracing::info!(page, "No more items");
            break;
        }

        captures.extend(fetched.captures);
        tracing::info!(page, total = captures.len(), "Fetched a page");

        if page >= fetched.total_pages {
            break;
        }
        page += 1;
        tokio::time::sleep(page_delay).await;
    }
    captures
}

fn capture_document(captures: &[Value]) -> Value {
    json!({ "nyplAPI": { "response": { "capture": captures } } })
}

fn write_json(path: &Path, document: &Value) -> Result<(), DownloadError> {
    let raw = serde_json::to_string_pretty(document)?;
    std::fs::write(path, raw).map_err(|source| DownloadError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug)]
pub struct DownloadSummary {
    pub collections: usize,
    pub captures: usize,
    pub metadata_path: PathBuf,
}

/// Writes one `metadata_<collection>.json` per collection that returned
/// items, then every capture merged into `broadcast.metadata_path`.
pub async fn run_download(config: Settings) -> Result<DownloadSummary, anyhow::Error> {
    let nypl = &config.nypl;
    let token = nypl.token().cloned().ok_or(DownloadError::MissingToken)?;
    let client = NyplClient::new(&nypl.base_url, token, nypl.timeout())?;

    let mut collections = 0;
    let mut all_captures = vec![];
    for collection in &nypl.collections {
        let captures =
            download_collection(&client, collection, nypl.per_page, nypl.page_delay()).await;
        if captures.is_empty() {
            tracing::warn!(%collection, "No items downloaded for this collection");
            continue;
        }

        let path = nypl.output_dir.join(format!("metadata_{collection}.json"));
        write_json(&path, &capture_document(&captures))?;
        tracing::info!(%collection, items = captures.len(), path = %path.display(), "Saved collection");

        collections += 1;
        all_captures.extend(captures);
    }

    if all_captures.is_empty() {
        return Err(DownloadError::NothingDownloaded.into());
    }

    let metadata_path = config.broadcast.metadata_path.clone();
    write_json(&metadata_path, &capture_document(&all_captures))?;

    Ok(DownloadSummary {
        collections,
        captures: all_captures.len(),
        metadata_path,
    })
}
