use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::{Result, SunsyncError};

/// A fully described HTTP request. Built once per call and reused unchanged for every attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// `"GET https://..."`, for log lines.
    pub(crate) fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Destination for a response body.
///
/// `Buffer` keeps only the body of the most recent attempt. `Discard` drops
/// everything and is exempt from the empty-body check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ResponseSink {
    #[default]
    Discard,
    Buffer(Vec<u8>),
}

impl ResponseSink {
    pub fn buffer() -> Self {
        Self::Buffer(Vec::new())
    }

    pub fn discard() -> Self {
        Self::Discard
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, Self::Discard)
    }

    /// True for an empty buffer. A discard sink is never considered empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Discard => false,
            Self::Buffer(bytes) => bytes.is_empty(),
        }
    }

    /// Replaces the captured body.
    pub fn write(&mut self, bytes: Vec<u8>) {
        if let Self::Buffer(buffer) = self {
            *buffer = bytes;
        }
    }

    pub(crate) fn reset(&mut self) {
        if let Self::Buffer(buffer) = self {
            buffer.clear();
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Discard => None,
            Self::Buffer(bytes) => Some(bytes),
        }
    }

    /// Body as text, lossily decoded. Empty for a discard sink.
    pub fn text(&self) -> String {
        self.bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    /// Decodes the captured body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self
            .bytes()
            .ok_or_else(|| SunsyncError::Decode("response was discarded".to_owned()))?;
        serde_json::from_slice(bytes)
            .map_err(|err| SunsyncError::Decode(format!("invalid response JSON: {err}")))
    }
}

/// Result of one [`RetryingCaller::execute`](crate::RetryingCaller::execute) run.
#[derive(Debug)]
pub struct CallOutcome {
    pub succeeded: bool,
    /// Body captured by the final attempt, when the sink buffers.
    pub response_body: Option<Vec<u8>>,
    pub attempts_used: u32,
    /// Why the final attempt failed. `None` on success.
    pub last_error: Option<SunsyncError>,
}

/// Decoded meaning of a `{success, msg, data}` response body.
///
/// A transport success can still carry `success == false`.
#[derive(Clone, Debug, PartialEq)]
pub struct BusinessResult {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl BusinessResult {
    /// Message text, or `"Unknown error"` when the API sent none.
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }
}
