// Final validation of responses.
//
// The executor hands every response that ends a request (a terminal client
// error, a success, or the last response after retries ran out) to a
// `ResponseHandler`, which either passes it through or turns it into an
// `HttpError`. The default `StatusCheck` rejects anything from 400 up.

use std::io::Read;

use crate::error::HttpError;

/// Bytes of the response body kept in a `HttpError::Status`.
pub const ERROR_BODY_LIMIT: usize = 2048;

/// What the pipeline needs to know about a response.
pub trait ResponseDescriptor {
    fn status_code(&self) -> u16;

    fn status_text(&self) -> String;

    /// Consume the response and return at most `limit` bytes of its body
    /// as lossy UTF-8.
    fn body_excerpt(self, limit: usize) -> String;
}

impl ResponseDescriptor for reqwest::blocking::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn status_text(&self) -> String {
        self.status().canonical_reason().unwrap_or("").to_string()
    }

    fn body_excerpt(self, limit: usize) -> String {
        let mut buf = Vec::new();
        // A body we cannot read still leaves the status to report.
        let _ = self.take(limit as u64).read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

pub trait ResponseHandler {
    /// Pass `response` through or reject it. `attempts` is the number of
    /// sends made for this request, the first one included.
    fn check<R: ResponseDescriptor>(&self, response: R, attempts: u32) -> Result<R, HttpError>;
}

/// Rejects every 4xx and 5xx status.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCheck;

impl ResponseHandler for StatusCheck {
    fn check<R: ResponseDescriptor>(&self, response: R, attempts: u32) -> Result<R, HttpError> {
        let status = response.status_code();
        if status < 400 {
            return Ok(response);
        }
        let status_text = response.status_text();
        Err(HttpError::Status {
            status,
            status_text,
            body: response.body_excerpt(ERROR_BODY_LIMIT),
            attempts,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory response used by the executor tests.
    #[derive(Debug, Clone, PartialEq)]
    pub struct FakeResponse {
        pub status: u16,
        pub body: String,
    }

    impl FakeResponse {
        pub fn new(status: u16) -> Self {
            FakeResponse {
                status,
                body: format!("body of {status}"),
            }
        }
    }

    impl ResponseDescriptor for FakeResponse {
        fn status_code(&self) -> u16 {
            self.status
        }

        fn status_text(&self) -> String {
            match self.status {
                200 => "OK",
                401 => "Unauthorized",
                500 => "Internal Server Error",
                _ => "",
            }
            .to_string()
        }

        fn body_excerpt(self, limit: usize) -> String {
            self.body.chars().take(limit).collect()
        }
    }

    #[test]
    fn passes_through_below_400() {
        for status in [200, 204, 302, 399] {
            let response = StatusCheck.check(FakeResponse::new(status), 1).unwrap();
            assert_eq!(response.status, status);
        }
    }

    #[test]
    fn rejects_client_and_server_errors() {
        for status in [400, 403, 404, 500, 503] {
            let err = StatusCheck.check(FakeResponse::new(status), 4).unwrap_err();
            match err {
                HttpError::Status {
                    status: got,
                    body,
                    attempts,
                    ..
                } => {
                    assert_eq!(got, status);
                    assert_eq!(body, format!("body of {status}"));
                    assert_eq!(attempts, 4);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn excerpt_is_limited() {
        let response = FakeResponse {
            status: 500,
            body: "x".repeat(ERROR_BODY_LIMIT * 2),
        };
        let err = StatusCheck.check(response, 1).unwrap_err();
        assert!(matches!(err, HttpError::Status { ref body, .. } if body.len() == ERROR_BODY_LIMIT));
    }
}
