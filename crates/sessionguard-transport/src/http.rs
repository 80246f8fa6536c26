//! `reqwest`-backed executor.
//!
//! The client keeps an in-memory cookie store, which is how credentials
//! reach the backend: the login and refresh endpoints set HTTP-only
//! cookies, and every later request carries them automatically. The
//! executor itself never looks at them.

use std::time::Duration;

use sessionguard_protocol::{Headers, RequestDescriptor, ResponseDescriptor};

use crate::{RequestExecutor, TransportError};

/// Settings for [`HttpExecutor`].
#[derive(Debug, Clone)]
pub struct HttpExecutorConfig {
    /// Deadline for a whole request, connect through body.
    ///
    /// Default: 30 seconds.
    pub timeout: Duration,
    /// Value of the `user-agent` header.
    pub user_agent: String,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("sessionguard/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A [`RequestExecutor`] that performs real HTTP calls.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Builds a client with a cookie store and the configured timeout.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidRequest`] if the TLS backend or
    /// client settings can't be initialised.
    pub fn new(config: HttpExecutorConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client. The caller is responsible for giving it
    /// a cookie store if the backend uses cookie sessions.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl RequestExecutor for HttpExecutor {
    async fn send(
        &self,
        request: &RequestDescriptor,
    ) -> Result<ResponseDescriptor, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            let body = request
                .body
                .to_bytes()
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            // Non-UTF-8 header values can't be represented; skip them.
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        tracing::debug!(%request, status, bytes = body.len(), "http request completed");
        Ok(ResponseDescriptor::new(status, headers, body.to_vec()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}
