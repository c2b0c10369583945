//! HTTP transport collaborator

use async_trait::async_trait;

use crate::{Error, Result};

/// How much of an error response body to carry in the error message
const BODY_EXCERPT_LEN: usize = 256;

/// Posts request bodies to the remote speech service.
///
/// The single suspension point of every flow: callers suspend until the
/// response arrives or the request fails.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` with the given headers, returning the response
    /// body on success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on connection failure or a non-success
    /// status, carrying the status code when one was received.
    async fn post(&self, url: &str, headers: &[(&str, String)], body: Vec<u8>)
    -> Result<Vec<u8>>;
}

/// Transport backed by a shared [`reqwest::Client`]
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Vec<u8>> {
        tracing::debug!(url, request_bytes = body.len(), "posting request");

        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(url, error = %e, "request failed");
            Error::from(e)
        })?;

        let status = response.status();
        tracing::debug!(url, status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
            tracing::error!(url, status = %status, body = %excerpt, "service error");
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                message: excerpt,
            });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(url, response_bytes = bytes.len(), "response body read");
        Ok(bytes.to_vec())
    }
}
