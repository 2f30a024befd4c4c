//! REST document store client
//!
//! Speaks a minimal document API:
//! - `PUT {base}/{collection}/{id}` with the JSON document as body (full overwrite)
//! - `GET {base}/{collection}` returning `{"documents": [{"id": .., "data": {..}}]}`

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{RemoteDocument, RemoteError, RemoteStore};

#[derive(Debug, Deserialize)]
struct ListResponse {
    documents: Vec<RemoteDocument>,
}

pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            timeout,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    /// Telemetry timestamps contain spaces and colons.
    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl RemoteStore for HttpDocumentStore {
    async fn upsert(
        &self,
        collection: &str,
        doc_id: &str,
        document: Value,
    ) -> Result<(), RemoteError> {
        let url = self.url(&[collection, doc_id])?;
        let response = self
            .client
            .put(url)
            .json(&document)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::Rejected(response.status().as_u16()));
        }

        debug!(collection, doc_id, "Upserted remote document");
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<RemoteDocument>, RemoteError> {
        let url = self.url(&[collection])?;
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::Rejected(response.status().as_u16()));
        }

        let listing: ListResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(listing.documents)
    }
}
