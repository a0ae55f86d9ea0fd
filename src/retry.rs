use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    CallOutcome, HttpTransport, RequestSpec, ResponseSink, Result, RetryPolicy, SunsyncError,
};

/// Value produced by a successful [`RetryingCaller::execute_with`] run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempted<R> {
    pub value: R,
    pub attempts_used: u32,
}

/// Runs requests through an [`HttpTransport`] under a [`RetryPolicy`].
///
/// Attempts are strictly sequential: the next one starts only after the
/// previous response has been written to the sink and judged.
#[derive(Clone, Debug)]
pub struct RetryingCaller<T> {
    transport: T,
    empty_response_delay: Duration,
    verbose: bool,
}

impl<T: HttpTransport> RetryingCaller<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            empty_response_delay: Duration::from_secs(5),
            verbose: false,
        }
    }

    /// Wait used after a 2xx response with an empty body, whatever the policy says.
    pub fn with_empty_response_delay(mut self, delay: Duration) -> Self {
        self.empty_response_delay = delay;
        self
    }

    /// Log every accepted response body at INFO.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Attempts `request` up to `policy.max_attempts` times.
    ///
    /// Exhaustion is reported through [`CallOutcome::succeeded`], never as an error.
    pub async fn execute(
        &self,
        request: &RequestSpec,
        policy: &RetryPolicy,
        sink: &mut ResponseSink,
    ) -> CallOutcome {
        let result = self.execute_with(request, policy, sink, |_| Ok(())).await;
        let response_body = sink.bytes().map(<[u8]>::to_vec);

        match result {
            Ok(done) => CallOutcome {
                succeeded: true,
                response_body,
                attempts_used: done.attempts_used,
                last_error: None,
            },
            Err(err) => {
                // Accepting every body leaves exhaustion as the only failure.
                let (attempts_used, last) = match err {
                    SunsyncError::MaxRetriesExceeded { attempts, last } => (attempts, *last),
                    other => (policy.max_attempts.max(1), other),
                };
                CallOutcome {
                    succeeded: false,
                    response_body,
                    attempts_used,
                    last_error: Some(last),
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), but every transport success is also
    /// passed to `accept`.
    ///
    /// A retryable error from `accept` (decode or business failure) counts as
    /// a failed attempt and waits `policy.delay`; a non-retryable one is
    /// returned immediately. After the last attempt the final error is
    /// wrapped in [`SunsyncError::MaxRetriesExceeded`].
    pub async fn execute_with<R, F>(
        &self,
        request: &RequestSpec,
        policy: &RetryPolicy,
        sink: &mut ResponseSink,
        mut accept: F,
    ) -> Result<Attempted<R>>
    where
        F: FnMut(&ResponseSink) -> Result<R>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!("{} attempt {attempt}/{max_attempts}", request.describe());
            sink.reset();

            let sent = self.transport.send(request, sink).await;
            let (failure, delay) = match sent {
                Ok(()) if sink.is_empty() => {
                    warn!("API call returned empty response: {}", request.describe());
                    let failure = SunsyncError::EmptyResponse {
                        method: request.method.to_string(),
                        url: request.url.clone(),
                    };
                    (failure, self.empty_response_delay)
                }
                Ok(()) => {
                    if self.verbose {
                        info!("response from {}: {}", request.describe(), sink.text());
                    }
                    match accept(sink) {
                        Ok(value) => {
                            return Ok(Attempted {
                                value,
                                attempts_used: attempt,
                            });
                        }
                        Err(err) if err.is_retryable() => (err, policy.delay),
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => {
                    warn!(
                        "API call failed: {}, attempt {attempt}/{max_attempts}: {err}",
                        request.describe()
                    );
                    (err, policy.delay)
                }
            };

            if attempt >= max_attempts {
                error!(
                    "API call failed after {max_attempts} attempts: {}",
                    request.describe()
                );
                return Err(SunsyncError::MaxRetriesExceeded {
                    attempts: attempt,
                    last: Box::new(failure),
                });
            }

            info!("Retrying in {} seconds...", delay.as_secs_f64());
            sleep(delay).await;
        }
    }
}
