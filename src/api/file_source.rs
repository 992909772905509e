//! Production [`FileSource`] wiring: fetch the bytes behind a webhook
//! `file_ref` (`bucket/object_name`) from object storage over HTTP.

use crate::session::{FileSource, OrchestratorError};
use async_trait::async_trait;
use reqwest::Client;

pub struct HttpFileSource {
    client: Client,
    base_url: String,
}

impl HttpFileSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl FileSource for HttpFileSource {
    async fn fetch(&self, file_ref: &str) -> Result<Vec<u8>, OrchestratorError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), file_ref);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OrchestratorError::ProcessingFailure {
                message: format!("fetching {url}: {e}"),
            })?
            .error_for_status()
            .map_err(|e| OrchestratorError::ProcessingFailure {
                message: format!("fetching {url}: {e}"),
            })?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OrchestratorError::ProcessingFailure {
                message: format!("reading response body from {url}: {e}"),
            })?;

        Ok(bytes.to_vec())
    }
}
