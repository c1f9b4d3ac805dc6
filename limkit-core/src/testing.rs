//! Offline transports and response builders.
//!
//! `ScriptedTransport` replays a fixed response queue or answers through a
//! handler closure, and records every request it sees. Used by the unit and
//! integration tests and usable by downstream crates that want to exercise a
//! client without a server.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::error::{LimError, Result};
use crate::transport::{HttpResponse, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

type Handler = Box<dyn Fn(&RecordedRequest) -> HttpResponse + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<HttpResponse>>),
    Handler(Handler),
}

pub struct ScriptedTransport {
    script: Script,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    /// Answer requests with `responses` in order; fails once the queue runs dry.
    pub fn new(responses: impl IntoIterator<Item = HttpResponse>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(responses.into_iter().collect())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request through `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> HttpResponse + Send + Sync + 'static,
    {
        Self {
            script: Script::Handler(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn respond(&self, request: RecordedRequest) -> Result<HttpResponse> {
        let response = match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| {
                    LimError::Network(format!("no scripted response for {}", request.url))
                })?,
            Script::Handler(handler) => handler(&request),
        };
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(response)
    }
}

impl Transport for ScriptedTransport {
    fn post(&self, url: &str, _content_type: &str, body: &str) -> Result<HttpResponse> {
        self.respond(RecordedRequest {
            method: Method::Post,
            url: url.to_string(),
            body: Some(body.to_string()),
        })
    }

    fn get(&self, url: &str) -> Result<HttpResponse> {
        self.respond(RecordedRequest {
            method: Method::Get,
            url: url.to_string(),
            body: None,
        })
    }
}

// ── Response bodies ─────────────────────────────────────────────────

/// Completed data report; `values` are row-major.
pub fn complete_body(columns: &[&str], dates: &[&str], values: &[f64]) -> String {
    let mut body = String::from("<DataRequestResponse status=\"100\"><Reports>");
    for c in columns {
        body.push_str(&format!("<ColumnHeadings>{c}</ColumnHeadings>"));
    }
    for d in dates {
        body.push_str(&format!("<RowDates>{d}</RowDates>"));
    }
    for v in values {
        body.push_str(&format!("<Values>{v}</Values>"));
    }
    body.push_str("</Reports></DataRequestResponse>");
    body
}

pub fn pending_body(job_id: u64) -> String {
    format!("<DataRequestResponse status=\"200\" id=\"{job_id}\"/>")
}

pub fn no_data_body() -> String {
    "<DataRequestResponse status=\"130\" statusMsg=\"No data\"/>".to_string()
}

pub fn status_body(code: i64, message: &str) -> String {
    format!("<DataRequestResponse status=\"{code}\" statusMsg=\"{message}\"/>")
}

pub fn upload_accepted_body(job_id: &str) -> String {
    format!("<uploadResponse intStatus=\"202\" jobID=\"{job_id}\"/>")
}

pub fn job_report_body(code: &str, message: &str) -> String {
    format!("<jobReport><status><code>{code}</code><message>{message}</message></status></jobReport>")
}

pub fn relations_body(symbol: &str, children: &[&str]) -> String {
    let mut body = format!("<Relations><Relation name=\"{symbol}\"><Children>");
    for child in children {
        body.push_str(&format!("<Relation name=\"{child}\"/>"));
    }
    body.push_str("</Children></Relation></Relations>");
    body
}
