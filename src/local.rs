use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

use crate::{
    ClientOptions, HttpTransport, ReqwestTransport, RequestSpec, ResponseSink, Result,
    RetryPolicy, RetryingCaller, SunsyncError,
};

/// Where the local Home Assistant API lives and how to authenticate.
#[derive(Debug)]
pub struct LocalApiConfig {
    /// `http` or `https`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Long-lived access token. Calls fail with
    /// [`SunsyncError::MissingCredential`] while this is unset.
    pub token: Option<SecretString>,
    /// Skip TLS verification (self-signed LAN certificates).
    pub accept_invalid_certs: bool,
}

impl LocalApiConfig {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            token: None,
            accept_invalid_certs: false,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Reads the local API location from the environment.
    ///
    /// Reads:
    /// - `HTTP_CONNECT_TYPE` — `http` (default) or `https`
    /// - `HA_IP` — host name or address, required
    /// - `HA_PORT` — defaults to `8123`
    /// - `HA_TOKEN` — optional here; its absence surfaces when calling
    ///
    /// HTTPS connections accept self-signed certificates.
    pub fn from_env() -> std::result::Result<Self, String> {
        let scheme = std::env::var("HTTP_CONNECT_TYPE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "http".to_owned());
        let host = std::env::var("HA_IP")
            .map_err(|_| "missing HA_IP environment variable".to_owned())?;
        if host.trim().is_empty() {
            return Err("HA_IP is set but empty".to_owned());
        }
        let port = match std::env::var("HA_PORT") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| format!("HA_PORT must be a port number, got '{raw}'"))?,
            _ => 8123,
        };

        let mut config = Self::new(scheme.trim(), host.trim(), port);
        config.accept_invalid_certs = config.scheme == "https";
        if let Ok(token) = std::env::var("HA_TOKEN") {
            if !token.trim().is_empty() {
                config = config.with_token(token);
            }
        }
        Ok(config)
    }

    /// `{scheme}://{host}:{port}`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Client for the local home-automation API.
///
/// Uses a static bearer token; there is no refresh logic and no
/// interpretation of response bodies.
#[derive(Debug)]
pub struct LocalClient<T = ReqwestTransport> {
    caller: RetryingCaller<T>,
    config: LocalApiConfig,
    policy: RetryPolicy,
}

impl LocalClient<ReqwestTransport> {
    pub fn new(config: LocalApiConfig, options: &ClientOptions) -> Result<Self> {
        let timeout = Duration::from_millis(options.timeout_ms);
        let transport = if config.accept_invalid_certs {
            ReqwestTransport::accepting_invalid_certs(timeout)?
        } else {
            ReqwestTransport::new(timeout)
        };
        Ok(Self::with_transport(transport, config, options))
    }

    /// Creates a client from `HA_*` variables and [`ClientOptions::from_env`].
    pub fn from_env() -> std::result::Result<Self, String> {
        let config = LocalApiConfig::from_env()?;
        let options = ClientOptions::from_env()?;
        Self::new(config, &options).map_err(|err| err.to_string())
    }
}

impl<T: HttpTransport> LocalClient<T> {
    pub fn with_transport(transport: T, config: LocalApiConfig, options: &ClientOptions) -> Self {
        let caller = RetryingCaller::new(transport)
            .with_empty_response_delay(options.empty_response_delay)
            .with_verbose(options.verbose);
        Self {
            caller,
            config,
            policy: options.transport_policy,
        }
    }

    pub fn config(&self) -> &LocalApiConfig {
        &self.config
    }

    /// Sends `method endpoint` to the local API, writing the reply into `sink`.
    ///
    /// Pass [`ResponseSink::discard`] when the body does not matter; empty
    /// replies are then not retried.
    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&str>,
        sink: &mut ResponseSink,
    ) -> Result<()> {
        if endpoint.trim().is_empty() {
            error!("Missing endpoint for local API call");
            return Err(SunsyncError::InvalidInput("endpoint is required".to_owned()));
        }
        let token = match &self.config.token {
            Some(token) if !token.expose_secret().trim().is_empty() => token,
            _ => {
                error!("No valid HA token available for API call");
                return Err(SunsyncError::MissingCredential("HA_TOKEN"));
            }
        };

        let url = local_url(&self.config.base_url(), endpoint);
        debug!("local API call {method} {url}");

        let mut request = RequestSpec::new(method, url)
            .header(
                "Authorization",
                normalize_bearer_authorization(token.expose_secret()),
            )
            .header("Content-Type", "application/json");
        if let Some(body) = body.filter(|body| !body.is_empty()) {
            request = request.body(body);
        }

        self.caller
            .execute_with(&request, &self.policy, sink, |_| Ok(()))
            .await
            .map(|_| ())
    }
}

fn local_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with('/') {
        format!("{base_url}{endpoint}")
    } else {
        format!("{base_url}/{endpoint}")
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
