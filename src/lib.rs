// Library root
// -----------
// Resilient HTTP request/response pipeline for the `rest-courier` CLI.
// The binary (`main.rs`) only parses arguments and hands over to `ui`.
//
// Module responsibilities:
// - `config`: file + environment configuration, retry defaults.
// - `context`: per-invocation credentials, retry policy, transport and the
//   two payloads (sent vs. logged).
// - `template`: `{{ .NAME }}` payload templates filled from the environment.
// - `http`: request descriptor that can be sent repeatedly.
// - `api`: request building (auth, default headers, debug logging) and the
//   blocking `ApiClient`.
// - `executor`: bounded fixed-interval retry keyed on status code.
// - `response`: final validation of responses into typed errors.
// - `upload`: streamed multipart/form-data bodies over a bounded pipe.
// - `error`: `HttpError` and process exit statuses.
// - `ui`: command line, logging setup and terminal flows.
//
// Nothing below `ui` exits the process; failures come back as `HttpError`.
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod http;
pub mod response;
pub mod template;
pub mod ui;
pub mod upload;

pub use api::{build_request, build_upload_request, default_headers, ApiClient};
pub use config::Config;
pub use context::{Context, Credentials};
pub use error::HttpError;
pub use executor::{classify, Classification, ResilientExecutor, RetryPolicy};
pub use http::{HttpRequest, RequestBody};
pub use response::{ResponseDescriptor, ResponseHandler, StatusCheck};
pub use upload::{MultipartUpload, UploadError};
