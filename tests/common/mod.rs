//! Programmable mock server for the integration tests.
//!
//! Starts an axum app on `127.0.0.1:0` inside a background thread with its
//! own tokio runtime, answers requests with a scripted list of status codes
//! (repeating the last one once the script runs out) and records every
//! request it receives.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    }
}

#[derive(Default)]
struct Script {
    statuses: Vec<u16>,
    served: usize,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<Script>>;

pub struct MockServer {
    addr: SocketAddr,
    state: Shared,
}

impl MockServer {
    pub fn start(statuses: &[u16]) -> Self {
        let state: Shared = Arc::new(Mutex::new(Script {
            statuses: statuses.to_vec(),
            ..Script::default()
        }));

        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        let app = Router::new()
            .fallback(handle)
            .layer(DefaultBodyLimit::disable())
            .with_state(state.clone());

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                axum::serve(listener, app).await
            })
            .unwrap();
        });

        MockServer { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }
}

async fn handle(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let mut script = state.lock().unwrap();
    script.requests.push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });

    let index = script.served.min(script.statuses.len().saturating_sub(1));
    let status = script.statuses.get(index).copied().unwrap_or(200);
    script.served += 1;

    let status = StatusCode::from_u16(status).unwrap();
    (status, format!("{{\"status\":{}}}", status.as_u16()))
}

/// An address nobody listens on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/unreachable")
}

/// Boundary parameter of a multipart content type.
pub fn boundary_of(content_type: &str) -> String {
    content_type
        .strip_prefix("multipart/form-data; boundary=")
        .unwrap_or_else(|| panic!("not a multipart content type: {content_type}"))
        .to_string()
}
