// HTTP request descriptor.
//
// An `HttpRequest` is plain data: method, URL, headers, credentials and a
// body source. It can be sent any number of times, which is what the retry
// loop needs. Fixed bodies are resent as is; upload bodies build a fresh
// multipart form (new boundary, file reopened) on every send.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Url};
use tracing::debug;

use crate::context::Credentials;
use crate::error::HttpError;
use crate::upload::{MultipartUpload, UploadStream};

pub enum RequestBody {
    Empty,
    Bytes(Vec<u8>),
    Upload(MultipartUpload),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Upload(upload) => write!(f, "Upload({})", upload.path().display()),
        }
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    authorization: Option<HeaderValue>,
}

pub fn parse_method(method: &str) -> Result<Method, HttpError> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| HttpError::InvalidRequest(format!("invalid HTTP method {method:?}")))
}

impl HttpRequest {
    pub fn new(method: Method, url: &str) -> Result<Self, HttpError> {
        let url = Url::parse(url)
            .map_err(|e| HttpError::InvalidRequest(format!("invalid URL {url:?}: {e}")))?;
        Ok(HttpRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            authorization: None,
        })
    }

    /// Set `name` to `value`, replacing an earlier value of the same name.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, HttpError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HttpError::InvalidRequest(format!("invalid header name {name:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| HttpError::InvalidRequest(format!("invalid value for header {name}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn headers(self, headers: &BTreeMap<String, String>) -> Result<Self, HttpError> {
        headers
            .iter()
            .try_fold(self, |request, (name, value)| request.header(name, value))
    }

    pub fn basic_auth(mut self, credentials: &Credentials) -> Result<Self, HttpError> {
        let mut value = HeaderValue::from_str(&credentials.authorization())
            .map_err(|_| HttpError::InvalidRequest("credentials contain invalid characters".into()))?;
        value.set_sensitive(true);
        self.authorization = Some(value);
        Ok(self)
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    /// Perform one round trip.
    pub fn send(&self, client: &Client) -> Result<Response, HttpError> {
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }

        match &self.body {
            RequestBody::Empty => builder.send().map_err(transport_error),
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()).send().map_err(transport_error),
            RequestBody::Upload(upload) => {
                let UploadStream { form, producer, .. } = upload.start()?;
                let sent = builder.multipart(form).send();
                let produced = producer.finish();
                debug!(produced = ?produced.as_ref().ok(), "upload stream finished");

                match (sent, produced) {
                    (Ok(response), Ok(_)) => Ok(response),
                    // The server answered before reading the whole body.
                    (Ok(response), Err(e)) if e.is_disconnect() => Ok(response),
                    (Ok(_), Err(e)) => Err(HttpError::Upload(e)),
                    (Err(_), Err(e)) if !e.is_disconnect() => Err(HttpError::Upload(e)),
                    (Err(e), _) => Err(transport_error(e)),
                }
            }
        }
    }
}

fn transport_error(err: reqwest::Error) -> HttpError {
    if err.is_builder() {
        HttpError::InvalidRequest(err.to_string())
    } else {
        HttpError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        let err = HttpRequest::new(Method::GET, "not a url").unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }

    #[test]
    fn method_names_are_case_insensitive() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert_eq!(parse_method("PUT").unwrap(), Method::PUT);
        assert!(parse_method("BAD METHOD").is_err());
    }

    #[test]
    fn later_header_replaces_earlier() {
        let request = HttpRequest::new(Method::GET, "http://localhost/x")
            .unwrap()
            .header("Accept", "text/plain")
            .unwrap()
            .header("accept", "application/json")
            .unwrap();
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers["accept"], "application/json");
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = HttpRequest::new(Method::GET, "http://localhost/x")
            .unwrap()
            .header("X-Bad", "line\nbreak")
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }

    #[test]
    fn authorization_is_kept_out_of_debug_output() {
        let request = HttpRequest::new(Method::GET, "http://localhost/x")
            .unwrap()
            .basic_auth(&Credentials::new("alice", "secret-token"))
            .unwrap();
        assert!(request.authorization().unwrap().is_sensitive());
        let printed = format!("{request:?}");
        assert!(!printed.contains("YWxpY2U6c2VjcmV0LXRva2Vu"));
        assert!(!request.headers.contains_key(AUTHORIZATION));
    }
}
