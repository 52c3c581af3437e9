use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use torrin_core::{
    CompleteResult, ErrorBody, UploadError, UploadId, UploadInit, UploadSession,
    UploadStatusReport,
};

use crate::error::Error;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default base path of the upload routes on the server.
const DEFAULT_BASE_PATH: &str = "/torrin/uploads";

/// HTTP client for the Torrin upload protocol.
///
/// A thin typed wrapper over the upload wire protocol; the upload state
/// machine lives in [`Upload`](crate::Upload).
#[derive(Debug, Clone)]
pub struct TorrinClient {
    client: Client,
    base_url: String,
    base_path: String,
}

/// Builder for configuring a [`TorrinClient`].
#[derive(Debug)]
pub struct TorrinClientBuilder {
    base_url: String,
    base_path: String,
    timeout: Duration,
    client: Option<Client>,
}

impl TorrinClientBuilder {
    /// Create a new builder with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            base_path: DEFAULT_BASE_PATH.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            client: None,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the server's upload base path.
    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Use a custom reqwest Client.
    ///
    /// Useful for configuring TLS, proxies, or other advanced settings.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<TorrinClient, Error> {
        let client = match self.client {
            Some(c) => c,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };
        Ok(TorrinClient {
            client,
            base_url: self.base_url,
            base_path: self.base_path,
        })
    }
}

impl TorrinClient {
    /// Create a new client with default configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        TorrinClientBuilder::new(base_url)
            .build()
            .expect("default client configuration should not fail")
    }

    /// Create a builder for advanced configuration.
    pub fn builder(base_url: impl Into<String>) -> TorrinClientBuilder {
        TorrinClientBuilder::new(base_url)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}{suffix}", self.base_url, self.base_path)
    }

    /// `POST /` -- create a new upload session.
    pub async fn init_upload(&self, init: &UploadInit) -> Result<UploadSession, Error> {
        let response = self
            .client
            .post(self.url("/"))
            .json(init)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    /// `PUT /{upload_id}/chunks/{index}` -- upload one chunk body.
    ///
    /// reqwest sets `Content-Length` from the buffered body.
    pub async fn upload_chunk(
        &self,
        upload_id: &UploadId,
        index: u32,
        body: Bytes,
        hash: Option<&str>,
    ) -> Result<(), Error> {
        let mut request = self
            .client
            .put(self.url(&format!("/{upload_id}/chunks/{index}")))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        if let Some(hash) = hash {
            request = request.header("x-torrin-chunk-hash", hash);
        }
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            debug!(upload_id = %upload_id, index, "chunk acknowledged");
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// `GET /{upload_id}/status` -- session state and chunk bookkeeping.
    pub async fn status(&self, upload_id: &UploadId) -> Result<UploadStatusReport, Error> {
        let response = self
            .client
            .get(self.url(&format!("/{upload_id}/status")))
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    /// `POST /{upload_id}/complete` -- finalize the upload.
    pub async fn complete(
        &self,
        upload_id: &UploadId,
        hash: Option<String>,
    ) -> Result<CompleteResult, Error> {
        let body = match hash {
            Some(hash) => serde_json::json!({ "hash": hash }),
            None => serde_json::json!({}),
        };
        let response = self
            .client
            .post(self.url(&format!("/{upload_id}/complete")))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    /// `DELETE /{upload_id}` -- cancel the upload.
    ///
    /// A 404 is silently tolerated: the session being gone is as canceled
    /// as it gets.
    pub async fn abort(&self, upload_id: &UploadId) -> Result<(), Error> {
        let response = self
            .client
            .delete(self.url(&format!("/{upload_id}")))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Map a transport failure to the wire taxonomy.
fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Upload(UploadError::Timeout(DEFAULT_TIMEOUT))
    } else {
        Error::Upload(UploadError::Network(err.to_string()))
    }
}

/// Decode a success body, or map the error body back into the taxonomy.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Upload(UploadError::Network(e.to_string())))
    } else {
        Err(error_from_response(response).await)
    }
}

/// Parse an error body into the shared taxonomy; unparseable responses
/// become `NETWORK_ERROR` carrying the transport detail.
async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => Error::Upload(UploadError::from_wire(
            &body.error.code,
            body.error.message,
            body.error.details,
        )),
        Err(e) => Error::Upload(UploadError::Network(format!("HTTP {status}: {e}"))),
    }
}
