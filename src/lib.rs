//! `sunsync-api` is a retrying, token-aware client for the Sunsynk cloud
//! inverter API, plus a thin relay to a local Home Assistant API.
//!
//! - [`CloudClient::acquire_token`] / [`CloudClient::validate_token`]
//! - [`CloudClient::fetch`] for telemetry
//! - [`CloudClient::push_settings`] for inverter settings
//! - [`LocalClient::call`] for the local automation API
//!
//! Every network call goes through [`RetryingCaller`], which applies a
//! [`RetryPolicy`] and treats empty bodies as failures.

mod cloud;
mod error;
mod local;
mod options;
mod retry;
mod token;
mod transport;
mod types;
mod wire;

#[cfg(test)]
mod testing;

pub use cloud::{api_v1_url, CloudClient, DEFAULT_BASE_URL};
pub use error::SunsyncError;
pub use local::{LocalApiConfig, LocalClient};
pub use options::{ClientOptions, RetryPolicy};
pub use retry::{Attempted, RetryingCaller};
pub use token::{Credentials, Token, TokenManager};
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{BusinessResult, CallOutcome, RequestSpec, ResponseSink};

pub type Result<T> = std::result::Result<T, SunsyncError>;
