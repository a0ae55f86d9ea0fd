use std::fmt;
use std::sync::{PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};

use crate::{
    wire::{self, TokenRequest},
    HttpTransport, RequestSpec, ResponseSink, Result, RetryPolicy, RetryingCaller, SunsyncError,
};

/// Bearer token state as of the most recent acquisition attempt.
///
/// A valid token always has a non-empty value. The three fields are only
/// ever replaced together.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Token {
    value: String,
    is_valid: bool,
    last_error_message: String,
}

impl Token {
    fn from_reply(value: String, success: bool, message: &str) -> Self {
        let is_valid = success && !value.is_empty();
        Self {
            value,
            is_valid,
            last_error_message: if is_valid {
                String::new()
            } else if success {
                "missing access_token".to_owned()
            } else {
                message.to_owned()
            },
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Why the last acquisition failed, empty after a success.
    pub fn last_error_message(&self) -> &str {
        &self.last_error_message
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("len", &self.value.len())
            .field("is_valid", &self.is_valid)
            .field("last_error_message", &self.last_error_message)
            .finish()
    }
}

/// Cloud account credentials.
#[derive(Debug)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Reads `SUNSYNK_USER` and `SUNSYNK_PASS`.
    ///
    /// Returns an error if either variable is missing or empty.
    pub fn from_env() -> std::result::Result<Self, String> {
        let username = std::env::var("SUNSYNK_USER")
            .map_err(|_| "missing SUNSYNK_USER environment variable".to_owned())?;
        let password = std::env::var("SUNSYNK_PASS")
            .map_err(|_| "missing SUNSYNK_PASS environment variable".to_owned())?;
        if username.trim().is_empty() {
            return Err("SUNSYNK_USER is set but empty".to_owned());
        }
        if password.is_empty() {
            return Err("SUNSYNK_PASS is set but empty".to_owned());
        }
        Ok(Self::new(username, password))
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Owns the bearer token and the flow that obtains it.
pub struct TokenManager<T> {
    caller: RetryingCaller<T>,
    credentials: Credentials,
    token_url: String,
    policy: RetryPolicy,
    token: RwLock<Token>,
}

impl<T> fmt::Debug for TokenManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("username", &self.credentials.username)
            .field("policy", &self.policy)
            .field("token", &self.token())
            .finish()
    }
}

impl<T> TokenManager<T> {
    pub fn new(
        caller: RetryingCaller<T>,
        credentials: Credentials,
        token_url: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            caller,
            credentials,
            token_url: token_url.into(),
            policy,
            token: RwLock::new(Token::default()),
        }
    }

    pub(crate) fn with_token_url(mut self, token_url: String) -> Self {
        self.token_url = token_url;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Snapshot of the current token.
    pub fn token(&self) -> Token {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_valid
    }

    /// Forgets the current token, e.g. after the API starts answering 401.
    pub fn invalidate(&self) {
        self.replace(Token::default());
    }

    /// Checks that a token value is present. Never touches the network.
    pub fn validate_token(&self) -> Result<()> {
        if self.token().value().is_empty() {
            error!("****Token could not be retrieved due to the following possibilities****");
            error!("Incorrect setup, please check the configured credentials.");
            error!("This host cannot reach Sunsynk.net due to network problems, or the Sunsynk server is down.");
            error!("The Sunsynk server is rejecting requests because they arrive too frequently.");
            error!("No values were updated; the next run will try again.");
            return Err(SunsyncError::NoToken);
        }

        info!("Sunsynk Server API Token: hidden for security reasons");
        Ok(())
    }

    fn replace(&self, token: Token) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Marks the held token invalid after a failed acquisition, keeping its value.
    fn mark_failed(&self, err: &SunsyncError) {
        let last_error_message = match err.root_cause() {
            SunsyncError::Business { message } => message.clone(),
            other => other.to_string(),
        };
        let mut token = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *token = Token {
            value: std::mem::take(&mut token.value),
            is_valid: false,
            last_error_message,
        };
    }

    fn accept_token_response(&self, sink: &ResponseSink) -> Result<()> {
        let reply = wire::decode_business(sink).map_err(|err| {
            warn!("Failed to parse token data: {err}");
            err
        })?;

        let value = wire::access_token(reply.data.as_ref());
        let token = Token::from_reply(value, reply.success, reply.message_or_default());
        let is_valid = token.is_valid;
        let message = token.last_error_message.clone();
        self.replace(token);

        if is_valid {
            Ok(())
        } else {
            warn!("Invalid token received: {message}. Retrying after a sleep...");
            Err(SunsyncError::Business { message })
        }
    }
}

impl<T: HttpTransport> TokenManager<T> {
    /// Obtains a fresh bearer token with the password grant.
    ///
    /// Each attempt re-posts the credentials and re-checks the reply, so a
    /// policy of N attempts means at most N token requests.
    pub async fn acquire_token(&self) -> Result<()> {
        info!("Getting bearer token from solar service provider's API.");

        let username = self.credentials.username.trim();
        let password = self.credentials.password.expose_secret();
        if username.is_empty() {
            error!("Cannot request a token without a username");
            return Err(SunsyncError::MissingCredential("SUNSYNK_USER"));
        }
        if password.is_empty() {
            error!("Cannot request a token without a password");
            return Err(SunsyncError::MissingCredential("SUNSYNK_PASS"));
        }

        let body = serde_json::to_string(&TokenRequest::password_grant(username, password))
            .map_err(|err| SunsyncError::InvalidInput(format!("token request: {err}")))?;
        let request = RequestSpec::post(&self.token_url)
            .header("Content-Type", "application/json")
            .body(body);
        let mut sink = ResponseSink::buffer();

        let result = self
            .caller
            .execute_with(&request, &self.policy, &mut sink, |sink| {
                self.accept_token_response(sink)
            })
            .await;

        match result {
            Ok(done) => {
                info!("Valid token retrieved after {} attempt(s).", done.attempts_used);
                info!("Bearer Token length: {}", self.token().value().len());
                Ok(())
            }
            Err(err) => {
                error!("Maximum retries reached. Cannot obtain auth token.");
                self.mark_failed(&err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Credentials, Token, TokenManager};
    use crate::testing::{Reply, ScriptedTransport};
    use crate::{RetryPolicy, RetryingCaller, SunsyncError};

    fn manager(transport: &ScriptedTransport) -> TokenManager<ScriptedTransport> {
        TokenManager::new(
            RetryingCaller::new(transport.clone()).with_empty_response_delay(Duration::ZERO),
            Credentials::new("me@example.com", "hunter2"),
            "https://api.test/oauth/token",
            RetryPolicy::new(3, Duration::ZERO),
        )
    }

    fn body(raw: &str) -> Reply {
        Reply::Body(raw.to_owned())
    }

    #[tokio::test]
    async fn valid_reply_yields_token_after_one_attempt() {
        let transport = ScriptedTransport::new([body(
            r#"{"success":"true","data":{"access_token":"abc"}}"#,
        )]);
        let tokens = manager(&transport);

        tokens.acquire_token().await.expect("token must be acquired");

        let token = tokens.token();
        assert!(token.is_valid());
        assert_eq!(token.value(), "abc");
        assert!(tokens.is_authenticated());
        assert_eq!(transport.hits(), 1);
    }

    #[tokio::test]
    async fn boolean_success_flag_is_accepted() {
        let transport = ScriptedTransport::new([body(
            r#"{"success":true,"data":{"access_token":"xyz"}}"#,
        )]);
        let tokens = manager(&transport);

        tokens.acquire_token().await.expect("token must be acquired");
        assert_eq!(tokens.token().value(), "xyz");
    }

    #[tokio::test]
    async fn rejected_credentials_exhaust_policy_and_keep_message() {
        let transport = ScriptedTransport::always(body(r#"{"success":"false","msg":"bad creds"}"#));
        let tokens = manager(&transport);

        let err = tokens.acquire_token().await.expect_err("must fail");

        assert!(matches!(
            err,
            SunsyncError::MaxRetriesExceeded { attempts: 3, .. }
        ));
        let token = tokens.token();
        assert!(!token.is_valid());
        assert_eq!(token.last_error_message(), "bad creds");
        assert_eq!(transport.hits(), 3);
    }

    #[tokio::test]
    async fn success_without_access_token_is_not_valid() {
        let transport = ScriptedTransport::new([
            body(r#"{"success":"true","data":{}}"#),
            body(r#"{"success":"true","data":{"access_token":"late"}}"#),
        ]);
        let tokens = manager(&transport);

        tokens.acquire_token().await.expect("second attempt succeeds");
        assert_eq!(tokens.token().value(), "late");
        assert_eq!(transport.hits(), 2);
    }

    #[tokio::test]
    async fn success_without_access_token_reports_missing_token() {
        let transport =
            ScriptedTransport::always(body(r#"{"success":"true","msg":"Success","data":{}}"#));
        let tokens = manager(&transport);

        let err = tokens.acquire_token().await.expect_err("never gets a token");

        assert!(matches!(
            err.root_cause(),
            SunsyncError::Business { message } if message == "missing access_token"
        ));
        assert_eq!(tokens.token().last_error_message(), "missing access_token");
        assert!(!tokens.token().is_valid());
    }

    #[tokio::test]
    async fn undecodable_replies_invalidate_but_keep_previous_value() {
        let transport = ScriptedTransport::new([body(
            r#"{"success":"true","data":{"access_token":"first"}}"#,
        )]);
        let tokens = manager(&transport);
        tokens.acquire_token().await.expect("first acquisition");

        let broken = ScriptedTransport::always(body("<html>oops</html>"));
        let tokens = TokenManager {
            caller: RetryingCaller::new(broken.clone()),
            ..tokens
        };
        let err = tokens.acquire_token().await.expect_err("decode failures exhaust");

        assert!(matches!(err.root_cause(), SunsyncError::Decode(_)));
        let token = tokens.token();
        assert_eq!(token.value(), "first");
        assert!(!token.is_valid());
        assert!(token.last_error_message().starts_with("decode error"));
        assert!(!tokens.is_authenticated());
        assert_eq!(broken.hits(), 3);
    }

    #[tokio::test]
    async fn failed_reacquire_over_transport_is_not_authenticated() {
        let transport = ScriptedTransport::new([body(
            r#"{"success":"true","data":{"access_token":"first"}}"#,
        )]);
        let tokens = manager(&transport);
        tokens.acquire_token().await.expect("first acquisition");

        let down = ScriptedTransport::always(Reply::Status(503));
        let tokens = TokenManager {
            caller: RetryingCaller::new(down.clone()),
            ..tokens
        };
        let err = tokens.acquire_token().await.expect_err("server is down");

        assert!(matches!(
            err.root_cause(),
            SunsyncError::Http { status: 503, .. }
        ));
        assert!(!tokens.is_authenticated());
        assert_eq!(tokens.token().value(), "first");
        assert_eq!(tokens.token().last_error_message(), "http error 503: ");
        assert_eq!(down.hits(), 3);
    }

    #[tokio::test]
    async fn token_request_posts_password_grant() {
        let transport = ScriptedTransport::new([body(
            r#"{"success":"true","data":{"access_token":"abc"}}"#,
        )]);
        let tokens = manager(&transport);
        tokens.acquire_token().await.expect("token must be acquired");

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, reqwest::Method::POST);
        assert_eq!(sent[0].url, "https://api.test/oauth/token");
        let body: serde_json::Value =
            serde_json::from_str(sent[0].body.as_deref().unwrap_or_default()).expect("json body");
        assert_eq!(body["username"], "me@example.com");
        assert_eq!(body["password"], "hunter2");
        assert_eq!(body["grant_type"], "password");
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_network() {
        let transport = ScriptedTransport::always(body("{}"));
        let tokens = TokenManager::new(
            RetryingCaller::new(transport.clone()),
            Credentials::new("user", ""),
            "https://api.test/oauth/token",
            RetryPolicy::new(3, Duration::ZERO),
        );

        let err = tokens.acquire_token().await.expect_err("must fail");
        assert!(matches!(err, SunsyncError::MissingCredential("SUNSYNK_PASS")));
        assert_eq!(transport.hits(), 0);
    }

    #[test]
    fn validate_on_empty_token_fails_without_network() {
        let transport = ScriptedTransport::always(body("{}"));
        let tokens = manager(&transport);

        assert!(matches!(tokens.validate_token(), Err(SunsyncError::NoToken)));
        assert_eq!(transport.hits(), 0);
    }

    #[tokio::test]
    async fn invalidate_clears_state() {
        let transport = ScriptedTransport::new([body(
            r#"{"success":"true","data":{"access_token":"abc"}}"#,
        )]);
        let tokens = manager(&transport);
        tokens.acquire_token().await.expect("token must be acquired");
        assert!(tokens.validate_token().is_ok());

        tokens.invalidate();
        assert_eq!(tokens.token(), Token::default());
        assert!(tokens.validate_token().is_err());
    }

    #[test]
    fn debug_redacts_token_and_password() {
        let token = Token::from_reply("secret-token".to_owned(), true, "");
        let debug = format!("{token:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));

        let credentials = format!("{:?}", Credentials::new("me", "hunter2"));
        assert!(!credentials.contains("hunter2"));
    }
}
