// Resilient request execution.
//
// One request runs through this state machine on the caller's thread:
//
//   send ── transport error ─────────────────────────────► Err(Transport)
//     │
//     ├─ 400..=403 ─────────────────────────────────────► handler (terminal)
//     ├─ < 400 ─────────────────────────────────────────► handler (pass)
//     └─ >= 404 ─► retry loop: sleep, resend, stop at < 400
//                   (transport errors stay fatal) ───────► handler
//
// Waits are blocking, fixed length, without backoff or jitter. The 400..=403
// versus 404+ split is deliberate: the lower codes mean a malformed or
// unauthorized request that a retry cannot repair.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use tracing::{debug, info, warn};

use crate::error::HttpError;
use crate::http::HttpRequest;
use crate::response::{ResponseDescriptor, ResponseHandler, StatusCheck};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends after the first attempt.
    pub max_retries: u32,
    /// Pause before every resend.
    pub wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, wait: Duration) -> Self {
        RetryPolicy { max_retries, wait }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Terminal,
    Transient,
}

pub fn classify(status: u16) -> Classification {
    match status {
        0..=399 => Classification::Success,
        400..=403 => Classification::Terminal,
        _ => Classification::Transient,
    }
}

type Sleep = Box<dyn Fn(Duration) + Send + Sync>;

pub struct ResilientExecutor<H = StatusCheck> {
    policy: RetryPolicy,
    handler: H,
    sleep: Sleep,
}

impl ResilientExecutor<StatusCheck> {
    pub fn new(policy: RetryPolicy) -> Self {
        ResilientExecutor {
            policy,
            handler: StatusCheck,
            sleep: Box::new(std::thread::sleep),
        }
    }
}

impl<H: ResponseHandler> ResilientExecutor<H> {
    pub fn with_handler<G: ResponseHandler>(self, handler: G) -> ResilientExecutor<G> {
        ResilientExecutor {
            policy: self.policy,
            handler,
            sleep: self.sleep,
        }
    }

    /// Replace the blocking sleep between retries.
    pub fn with_sleep<F>(mut self, sleep: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `request` over `client` with the retry policy applied.
    pub fn execute(&self, client: &Client, request: &HttpRequest, debug: bool) -> Result<Response, HttpError> {
        let response = self.run(|| request.send(client))?;
        if debug {
            debug!(
                "HTTP response: {} {:?} headers={:?}",
                request.url,
                response.status(),
                response.headers()
            );
        }
        Ok(response)
    }

    /// Drive the state machine with an arbitrary `send`. Every call of
    /// `send` must issue the identical request.
    pub fn run<R, S>(&self, mut send: S) -> Result<R, HttpError>
    where
        R: ResponseDescriptor,
        S: FnMut() -> Result<R, HttpError>,
    {
        let mut response = send()?;
        let mut attempts = 1;

        if classify(response.status_code()) == Classification::Transient {
            warn!(
                "Received unexpected Status Code {} ({}) from server. Retrying in {} seconds...",
                response.status_code(),
                response.status_text(),
                self.policy.wait.as_secs()
            );

            for retry in 1..=self.policy.max_retries {
                (self.sleep)(self.policy.wait);

                info!("retry {}/{}", retry, self.policy.max_retries);
                response = send()?;
                attempts += 1;

                if classify(response.status_code()) == Classification::Success {
                    break;
                }
            }
        }

        self.handler.check(response, attempts)
    }
}

impl<H: fmt::Debug> fmt::Debug for ResilientExecutor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("policy", &self.policy)
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}
