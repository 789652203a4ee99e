// Error types shared by the request pipeline.
//
// Every fatal outcome of a request (transport failure, terminal status,
// exhausted retries, broken upload stream) is an `HttpError`. The library
// never exits the process itself: the binary maps errors to exit statuses
// through `exit_code`.

use thiserror::Error;

use crate::upload::UploadError;

/// Process exit status for any HTTP failure.
pub const EXIT_CODE_HTTP_ERROR: i32 = 4;
/// Process exit status for missing or invalid configuration.
pub const EXIT_CODE_CONFIG: i32 = 2;
/// Process exit status for local I/O failures (reading payload files etc.).
pub const EXIT_CODE_IO_ERROR: i32 = 6;

#[derive(Debug, Error)]
pub enum HttpError {
    /// The request could not be constructed: bad URL, bad header, or the
    /// transport could not be built. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection refused, DNS failure, TLS handshake and the like.
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with a status the response handler treats as
    /// terminal. `attempts` counts every send, the first one included.
    #[error("server returned {status} {status_text} after {attempts} attempt(s): {body}")]
    Status {
        status: u16,
        status_text: String,
        body: String,
        attempts: u32,
    },

    /// The multipart producer failed while encoding the upload body.
    #[error("upload stream failed: {0}")]
    Upload(#[from] UploadError),
}

impl HttpError {
    /// Status code of the last response, if a response was received at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        EXIT_CODE_HTTP_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_reports_code_and_exit_status() {
        let err = HttpError::Status {
            status: 503,
            status_text: "Service Unavailable".into(),
            body: "try later".into(),
            attempts: 3,
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.exit_code(), EXIT_CODE_HTTP_ERROR);
        assert_eq!(
            err.to_string(),
            "server returned 503 Service Unavailable after 3 attempt(s): try later"
        );
    }

    #[test]
    fn non_status_errors_have_no_status() {
        let err = HttpError::InvalidRequest("relative URL without a base".into());
        assert_eq!(err.status(), None);
        assert_eq!(err.exit_code(), EXIT_CODE_HTTP_ERROR);
    }
}
