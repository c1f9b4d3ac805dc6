//! Async request engine: submit a query, poll the job, resolve to a table.
//!
//! ```text
//! New ──POST──▶ Submitted{job} ──GET /job──▶ Submitted{job} ... ─▶ Done | Empty
//!                     │                                   (error at any step aborts)
//! ```
//!
//! Every call inspects the HTTP status first (non-200 is fatal, body surfaced)
//! and then the embedded status: 100 done, 130 empty, 200 pending, anything
//! else a server error. Pending responses consume one try of the
//! `PollPolicy`; running out of tries is its own error.

use std::thread;
use std::time::Duration;

use quick_xml::escape::partial_escape;

use crate::error::{LimError, Result};
use crate::report::{build_table, parse_response, RequestStatus};
use crate::table::SeriesTable;
use crate::transport::{HttpResponse, Transport, CONTENT_TYPE_XML};

/// Outcome of one polling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Fixed-interval, bounded retry loop shared by data requests and upload jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    tries: u32,
    interval: Duration,
}

impl PollPolicy {
    pub const DEFAULT_TRIES: u32 = 50;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2500);

    /// `tries` is clamped to at least one attempt.
    pub fn new(tries: u32, interval: Duration) -> Self {
        Self {
            tries: tries.max(1),
            interval,
        }
    }

    /// No sleeping between attempts.
    pub fn immediate(tries: u32) -> Self {
        Self::new(tries, Duration::ZERO)
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Call `attempt` (1-based attempt number) until it is ready, fails, or the
    /// try budget is spent. Sleeps `interval` after every pending attempt that
    /// still has a successor.
    pub fn run<T, F>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<Poll<T>>,
    {
        for n in 1..=self.tries {
            match attempt(n)? {
                Poll::Ready(value) => return Ok(value),
                Poll::Pending => {
                    if n < self.tries && !self.interval.is_zero() {
                        thread::sleep(self.interval);
                    }
                }
            }
        }
        Err(LimError::TriesExhausted { tries: self.tries })
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TRIES, Self::DEFAULT_INTERVAL)
    }
}

/// Where a data request currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    New,
    Submitted { job_id: u64 },
}

/// Classification of one server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Done(SeriesTable),
    Empty,
    Pending { job_id: u64 },
}

/// Wrap query text in the data-request envelope.
pub fn request_envelope(query: &str) -> String {
    format!(
        "<DataRequest><Query><Text>{}</Text></Query></DataRequest>",
        partial_escape(query)
    )
}

/// Classify a response from the data-request endpoint.
pub fn resolve(response: HttpResponse) -> Result<Resolution> {
    let response = response.require_ok()?;
    let parsed = parse_response(&response.body)?;

    match parsed.status {
        RequestStatus::Complete => Ok(Resolution::Done(build_table(&parsed.report)?)),
        RequestStatus::NoData => {
            tracing::info!("no data");
            Ok(Resolution::Empty)
        }
        RequestStatus::Pending => {
            let job_id = parsed.job_id.ok_or_else(|| {
                LimError::Parse("pending response carries no job id".into())
            })?;
            Ok(Resolution::Pending { job_id })
        }
        RequestStatus::Other(code) => Err(LimError::Server {
            code,
            message: parsed
                .message
                .unwrap_or_else(|| format!("status {code}")),
        }),
    }
}

pub struct RequestEngine<T: Transport> {
    transport: T,
    endpoint: String,
    policy: PollPolicy,
}

impl<T: Transport> RequestEngine<T> {
    pub fn new(transport: T, endpoint: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    fn call(&self, state: RequestState, body: &str) -> Result<HttpResponse> {
        match state {
            RequestState::New => self.transport.post(&self.endpoint, CONTENT_TYPE_XML, body),
            RequestState::Submitted { job_id } => self
                .transport
                .get(&format!("{}/{job_id}", self.endpoint)),
        }
    }

    /// Run `query` to completion. `Ok(None)` means the server had no data.
    pub fn execute(&self, query: &str) -> Result<Option<SeriesTable>> {
        let body = request_envelope(query);
        let mut state = RequestState::New;

        self.policy.run(|attempt| {
            let response = self.call(state, &body)?;
            match resolve(response)? {
                Resolution::Done(table) => {
                    tracing::debug!(attempt, rows = table.height(), "request complete");
                    Ok(Poll::Ready(Some(table)))
                }
                Resolution::Empty => Ok(Poll::Ready(None)),
                Resolution::Pending { job_id } => {
                    tracing::debug!(attempt, job_id, "not complete");
                    state = RequestState::Submitted { job_id };
                    Ok(Poll::Pending)
                }
            }
        })
    }
}
