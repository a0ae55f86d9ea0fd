use std::fmt;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::{
    wire, Attempted, BusinessResult, ClientOptions, Credentials, HttpTransport, ReqwestTransport,
    RequestSpec, ResponseSink, Result, RetryingCaller, SunsyncError, TokenManager,
};

/// Production Sunsynk API host.
pub const DEFAULT_BASE_URL: &str = "https://api.sunsynk.net";

/// Resolves an endpoint against the `/api/v1` prefix.
///
/// Example: `"inverters"` → `"https://api.sunsynk.net/api/v1/inverters"`.
/// Absolute `http(s)://` URLs are passed through unchanged.
pub fn api_v1_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_owned();
    }
    format!(
        "{}/api/v1/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Authenticated client for the Sunsynk cloud API.
///
/// Holds its own [`TokenManager`]. Calls never refresh the token
/// implicitly: acquire it first, then fetch or push.
pub struct CloudClient<T = ReqwestTransport> {
    caller: RetryingCaller<T>,
    tokens: TokenManager<T>,
    base_url: String,
    options: ClientOptions,
}

impl<T> fmt::Debug for CloudClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudClient")
            .field("base_url", &self.base_url)
            .field("tokens", &self.tokens)
            .field("options", &self.options)
            .finish()
    }
}

impl CloudClient<ReqwestTransport> {
    /// Creates a client for the production API with default options.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_options(credentials, ClientOptions::default())
    }

    pub fn with_options(credentials: Credentials, options: ClientOptions) -> Self {
        let transport = ReqwestTransport::new(Duration::from_millis(options.timeout_ms));
        Self::with_transport(transport, credentials, options)
    }

    /// Creates a client from `SUNSYNK_*` credentials and options in the environment.
    ///
    /// See [`Credentials::from_env`] and [`ClientOptions::from_env`].
    pub fn from_env() -> std::result::Result<Self, String> {
        let credentials = Credentials::from_env()?;
        let options = ClientOptions::from_env()?;
        Ok(Self::with_options(credentials, options))
    }
}

impl<T: HttpTransport + Clone> CloudClient<T> {
    pub fn with_transport(transport: T, credentials: Credentials, options: ClientOptions) -> Self {
        let caller = RetryingCaller::new(transport)
            .with_empty_response_delay(options.empty_response_delay)
            .with_verbose(options.verbose);
        let tokens = TokenManager::new(
            caller.clone(),
            credentials,
            format!("{DEFAULT_BASE_URL}/oauth/token"),
            options.token_policy,
        );
        Self {
            caller,
            tokens,
            base_url: DEFAULT_BASE_URL.to_owned(),
            options,
        }
    }
}

impl<T> CloudClient<T> {
    /// Points the client (token endpoint included) at another host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        self.tokens = self.tokens.with_token_url(format!("{base_url}/oauth/token"));
        self.base_url = base_url;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenManager<T> {
        &self.tokens
    }

    pub fn validate_token(&self) -> Result<()> {
        self.tokens.validate_token()
    }

    /// `POST` target for a device's settings.
    pub fn settings_url(&self, device_id: &str) -> String {
        format!(
            "{}/api/v1/common/setting/{}/set",
            self.base_url,
            device_id.trim()
        )
    }

    fn bearer_header(&self) -> Result<String> {
        let token = self.tokens.token();
        if !token.is_valid() {
            error!("No valid bearer token available for API call");
            return Err(SunsyncError::Unauthenticated);
        }
        Ok(format!("Bearer {}", token.value()))
    }
}

impl<T: HttpTransport> CloudClient<T> {
    pub async fn acquire_token(&self) -> Result<()> {
        self.tokens.acquire_token().await
    }

    /// GETs `endpoint` into `sink` with the bearer token attached.
    ///
    /// Fails with [`SunsyncError::Unauthenticated`] before any network call
    /// when no valid token is held.
    pub async fn fetch(&self, endpoint: &str, sink: &mut ResponseSink) -> Result<()> {
        self.fetch_with(endpoint, sink, |_| Ok(())).await.map(|_| ())
    }

    /// Fetches `endpoint` and decodes the `{success, msg, data}` envelope.
    ///
    /// Undecodable bodies are retried; a `success: false` reply is returned
    /// as-is for the caller to judge.
    pub async fn fetch_json(&self, endpoint: &str) -> Result<BusinessResult> {
        let mut sink = ResponseSink::buffer();
        let done = self
            .fetch_with(endpoint, &mut sink, wire::decode_business)
            .await?;
        Ok(done.value)
    }

    async fn fetch_with<R, F>(
        &self,
        endpoint: &str,
        sink: &mut ResponseSink,
        accept: F,
    ) -> Result<Attempted<R>>
    where
        F: FnMut(&ResponseSink) -> Result<R>,
    {
        if endpoint.trim().is_empty() {
            error!("Missing endpoint for cloud API call");
            return Err(SunsyncError::InvalidInput("endpoint is required".to_owned()));
        }
        let authorization = self.bearer_header()?;

        let request = RequestSpec::get(api_v1_url(&self.base_url, endpoint))
            .header("Content-Type", "application/json")
            .header("authorization", authorization);

        self.caller
            .execute_with(&request, &self.options.transport_policy, sink, accept)
            .await
    }

    /// Sends a settings payload to the inverter `device_id`.
    ///
    /// The payload must be well-formed JSON; it is checked before any
    /// network activity. A reply with a falsy `success` is retried like a
    /// transport failure, up to the token policy's attempt limit.
    pub async fn push_settings(&self, device_id: &str, payload_json: &str) -> Result<()> {
        let device_id = device_id.trim();
        if device_id.is_empty() || payload_json.trim().is_empty() {
            error!("Missing required parameters for settings push");
            return Err(SunsyncError::InvalidInput(
                "device id and settings payload are required".to_owned(),
            ));
        }
        if let Err(err) = serde_json::from_str::<serde_json::Value>(payload_json) {
            error!("Invalid JSON format in settings data");
            return Err(SunsyncError::InvalidInput(format!(
                "settings payload is not valid JSON: {err}"
            )));
        }
        let authorization = self.bearer_header()?;

        info!("Sending settings to inverter {device_id}");
        if self.options.verbose {
            info!("Sending settings data: {payload_json}");
        }

        let request = RequestSpec::post(self.settings_url(device_id))
            .header("Content-Type", "application/json")
            .header("authorization", authorization)
            .body(payload_json);
        let mut sink = ResponseSink::buffer();

        let result = self
            .caller
            .execute_with(&request, &self.options.token_policy, &mut sink, |sink| {
                let reply = wire::decode_business(sink).map_err(|err| {
                    warn!("Failed to parse settings response: {err}");
                    err
                })?;
                if reply.success {
                    return Ok(());
                }
                let message = reply.message_or_default().to_owned();
                warn!("Failed to update inverter settings: {message}");
                Err(SunsyncError::Business { message })
            })
            .await;

        match result {
            Ok(done) => {
                info!(
                    "Successfully updated inverter settings after {} attempt(s)",
                    done.attempts_used
                );
                Ok(())
            }
            Err(err) => {
                error!("Failed to update inverter {device_id} settings: {err}");
                Err(err)
            }
        }
    }
}
