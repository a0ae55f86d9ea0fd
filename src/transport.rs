use std::future::Future;
use std::time::Duration;

use crate::{RequestSpec, ResponseSink, Result, SunsyncError};

/// Executes a single HTTP request.
///
/// Implementations write the response body into `sink` and return `Ok(())`
/// for a 2xx status. Any other status or a connection failure is an error.
/// Retrying is not the transport's job; see [`RetryingCaller`](crate::RetryingCaller).
pub trait HttpTransport {
    fn send(
        &self,
        request: &RequestSpec,
        sink: &mut ResponseSink,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a transport with a per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Creates a transport that skips TLS certificate verification.
    ///
    /// Home Assistant installs commonly serve HTTPS with a self-signed
    /// certificate on the LAN.
    pub fn accepting_invalid_certs(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(SunsyncError::Transport)?;
        Ok(Self::with_client(http, timeout))
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec, sink: &mut ResponseSink) -> Result<()> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(SunsyncError::Transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(SunsyncError::Transport)?;

        if !status.is_success() {
            return Err(SunsyncError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        sink.write(body.to_vec());
        Ok(())
    }
}
