use std::time::Duration;

/// How many times a request is attempted and how long to wait in between.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never below 1.
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Default policy for token acquisition and settings pushes: 3 attempts, 30 s apart.
    pub fn token_default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }

    /// Default policy for plain transport calls: 3 attempts, 5 s apart.
    pub fn transport_default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Configures timeouts, retry policies and logging verbosity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Policy for token acquisition and settings pushes.
    pub token_policy: RetryPolicy,
    /// Policy for telemetry fetches and local API calls.
    pub transport_policy: RetryPolicy,
    /// Wait after a 2xx response with an empty body, regardless of policy.
    pub empty_response_delay: Duration,
    /// Log raw response bodies and outgoing payloads at INFO.
    pub verbose: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            token_policy: RetryPolicy::token_default(),
            transport_policy: RetryPolicy::transport_default(),
            empty_response_delay: Duration::from_secs(5),
            verbose: false,
        }
    }
}

impl ClientOptions {
    /// Reads options from the environment, falling back to defaults.
    ///
    /// Reads:
    /// - `ENABLE_VERBOSE_LOG` — `"true"` enables raw body logging
    /// - `SUNSYNK_MAX_RETRIES` — attempts for both policies
    /// - `SUNSYNK_RETRY_DELAY_SECS` — token/settings policy delay
    /// - `SUNSYNK_TRANSPORT_RETRY_DELAY_SECS` — transport policy delay
    /// - `SUNSYNK_TIMEOUT_MS` — per-request timeout
    ///
    /// Returns an error if a numeric variable is set but does not parse.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(value) = lookup("ENABLE_VERBOSE_LOG") {
            options.verbose = value.trim() == "true";
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "SUNSYNK_MAX_RETRIES")? {
            options.token_policy = RetryPolicy::new(attempts, options.token_policy.delay);
            options.transport_policy = RetryPolicy::new(attempts, options.transport_policy.delay);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SUNSYNK_RETRY_DELAY_SECS")? {
            options.token_policy.delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SUNSYNK_TRANSPORT_RETRY_DELAY_SECS")? {
            options.transport_policy.delay = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "SUNSYNK_TIMEOUT_MS")? {
            options.timeout_ms = ms;
        }

        Ok(options)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> std::result::Result<Option<T>, String> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{key} must be a non-negative integer, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::{ClientOptions, RetryPolicy};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn policy_never_allows_zero_attempts() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn defaults_match_token_and_transport_policies() {
        let options = ClientOptions::default();
        assert_eq!(options.token_policy, RetryPolicy::new(3, Duration::from_secs(30)));
        assert_eq!(options.transport_policy, RetryPolicy::new(3, Duration::from_secs(5)));
        assert_eq!(options.empty_response_delay, Duration::from_secs(5));
        assert!(!options.verbose);
    }

    #[test]
    fn env_overrides_are_applied() {
        let options = ClientOptions::from_lookup(lookup(&[
            ("ENABLE_VERBOSE_LOG", "true"),
            ("SUNSYNK_MAX_RETRIES", "5"),
            ("SUNSYNK_RETRY_DELAY_SECS", "10"),
            ("SUNSYNK_TIMEOUT_MS", "2500"),
        ]))
        .expect("options must parse");

        assert!(options.verbose);
        assert_eq!(options.token_policy, RetryPolicy::new(5, Duration::from_secs(10)));
        assert_eq!(options.transport_policy, RetryPolicy::new(5, Duration::from_secs(5)));
        assert_eq!(options.timeout_ms, 2500);
    }

    #[test]
    fn env_rejects_garbage_numbers() {
        let err = ClientOptions::from_lookup(lookup(&[("SUNSYNK_MAX_RETRIES", "many")]))
            .expect_err("must reject non-numeric value");
        assert!(err.contains("SUNSYNK_MAX_RETRIES"));
    }
}
