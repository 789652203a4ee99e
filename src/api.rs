// API client module: builds authenticated requests from a `Context` and
// runs them through the `ResilientExecutor`. Everything here is blocking
// and runs on the caller's thread.

use std::collections::BTreeMap;
use std::path::Path;

use reqwest::blocking::Response;
use reqwest::Method;
use tracing::debug;

use crate::context::Context;
use crate::error::HttpError;
use crate::executor::ResilientExecutor;
use crate::http::{HttpRequest, RequestBody};
use crate::upload::MultipartUpload;

/// Headers applied when the caller supplies none.
pub fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
    ])
}

/// Build an authenticated request carrying the context's payload.
///
/// With `headers == None` the JSON defaults from [`default_headers`] are used.
/// In debug mode the request is logged with the context's *logging* payload;
/// the payload that is actually sent never reaches the log.
pub fn build_request(
    method: Method,
    url: &str,
    context: &Context,
    headers: Option<&BTreeMap<String, String>>,
) -> Result<HttpRequest, HttpError> {
    let defaults;
    let headers = match headers {
        Some(headers) => headers,
        None => {
            defaults = default_headers();
            &defaults
        }
    };

    if context.debug {
        debug!(
            "Sending {}:{}\n Headers: {:?}\n Origin-Content: {:?}",
            method,
            url,
            headers,
            String::from_utf8_lossy(context.content_for_logging())
        );
    }

    HttpRequest::new(method, url)?
        .headers(headers)?
        .basic_auth(&context.credentials)
        .map(|request| request.body(RequestBody::Bytes(context.content_to_send().to_vec())))
}

/// Build an authenticated multipart upload request. The body is produced
/// when the request is sent, so nothing of the file is read here.
pub fn build_upload_request(
    url: &str,
    context: &Context,
    upload: MultipartUpload,
) -> Result<HttpRequest, HttpError> {
    if context.debug {
        debug!(
            "Uploading POST:{}\n File: {}\n Form field: {:?}",
            url,
            upload.path().display(),
            upload.file_name()
        );
    }

    Ok(HttpRequest::new(Method::POST, url)?
        .basic_auth(&context.credentials)?
        .body(RequestBody::Upload(upload)))
}

/// Blocking client that owns a `Context` and an executor built from its
/// retry policy.
#[derive(Debug)]
pub struct ApiClient {
    context: Context,
    executor: ResilientExecutor,
}

impl ApiClient {
    pub fn new(context: Context) -> Self {
        let executor = ResilientExecutor::new(context.retry);
        ApiClient { context, executor }
    }

    pub fn with_executor(context: Context, executor: ResilientExecutor) -> Self {
        ApiClient { context, executor }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Send the context's payload with JSON content-type and accept headers.
    pub fn send_with_default_header(&self, method: Method, url: &str) -> Result<Response, HttpError> {
        self.send(method, url, None)
    }

    pub fn send_with_header(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Response, HttpError> {
        self.send(method, url, Some(headers))
    }

    /// Upload `file` as form field `param_name` along with `params`.
    pub fn upload_file(
        &self,
        url: &str,
        params: &BTreeMap<String, String>,
        param_name: &str,
        file: &Path,
    ) -> Result<Response, HttpError> {
        let upload = MultipartUpload::new(param_name, file).fields(params.clone());
        let request = build_upload_request(url, &self.context, upload)?;
        self.executor.execute(&self.context.client, &request, self.context.debug)
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        headers: Option<&BTreeMap<String, String>>,
    ) -> Result<Response, HttpError> {
        let request = build_request(method, url, &self.context, headers)?;
        self.executor.execute(&self.context.client, &request, self.context.debug)
    }
}
