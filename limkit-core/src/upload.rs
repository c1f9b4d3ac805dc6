//! Upload engine: tables into the platform's row/column ingestion XML.
//!
//! Each present cell becomes one `<Row>` with five positional `<Col>`s:
//! tree path, column, day number (days since 1899-12-30), value, description.
//! Table columns may be `tree-path;column`; a bare tree path uses the default
//! column. Tables are sent in batches of 100 table rows, each batch numbered
//! from 1, and every accepted job is polled until the server reports success.

use chrono::NaiveDate;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::fmt;

use crate::config::LimConfig;
use crate::engine::{Poll, PollPolicy};
use crate::error::{LimError, Result};
use crate::table::SeriesTable;
use crate::transport::{Transport, CONTENT_TYPE_TEXT_XML};
use crate::xml::parse_document;

pub const DEFAULT_UPLOAD_COLUMN: &str = "TopColumn:Price:Close";
pub const UPLOAD_BATCH_ROWS: usize = 100;

pub const STATUS_ACCEPTED: &str = "202";
pub const JOB_SUCCESS: &str = "300";
pub const JOB_SUCCESS_WITH_WARNING: &str = "302";

/// Per-upload settings applied to every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMeta {
    pub description: String,
    /// Column used when a table column has no `;column` part.
    pub default_column: String,
}

impl Default for UploadMeta {
    fn default() -> Self {
        Self {
            description: String::new(),
            default_column: DEFAULT_UPLOAD_COLUMN.to_string(),
        }
    }
}

impl UploadMeta {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRow {
    pub tree_path: String,
    pub column: String,
    pub day_number: i64,
    pub value: f64,
    pub description: String,
}

/// Days since 1899-12-30 (spreadsheet serial date). The ingestion format is
/// day-granular, so rows stamped within one day share a number.
pub fn day_number(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    (date - epoch).num_days()
}

fn split_target<'a>(column: &'a str, default_column: &'a str) -> (&'a str, &'a str) {
    let mut tokens = column.split(';');
    let tree_path = tokens.next().unwrap_or(column);
    (tree_path, tokens.next().unwrap_or(default_column))
}

/// Flatten a table into upload rows, row by row, skipping absent cells.
pub fn rows_from_table(table: &SeriesTable, meta: &UploadMeta) -> Vec<UploadRow> {
    let targets: Vec<(&str, &str)> = table
        .columns()
        .iter()
        .map(|c| split_target(c, &meta.default_column))
        .collect();

    let mut rows = Vec::new();
    for (at, cells) in table.iter_rows() {
        for (cell, (tree_path, column)) in cells.iter().zip(&targets) {
            let Some(value) = cell.filter(|v| !v.is_nan()) else {
                continue;
            };
            rows.push(UploadRow {
                tree_path: tree_path.to_string(),
                column: column.to_string(),
                day_number: day_number(at.date()),
                value,
                description: meta.description.clone(),
            });
        }
    }
    rows
}

fn xml_err(e: impl fmt::Display) -> LimError {
    LimError::Xml(e.to_string())
}

/// Serialize rows as `<ExcelData><Rows><Row num="1"><Cols><Col num="1">…`.
pub fn build_upload_xml(rows: &[UploadRow]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());

    writer
        .write_event(Event::Start(BytesStart::new("ExcelData")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("Rows")))
        .map_err(xml_err)?;

    for (i, row) in rows.iter().enumerate() {
        let row_num = (i + 1).to_string();
        writer
            .write_event(Event::Start(
                BytesStart::new("Row").with_attributes([("num", row_num.as_str())]),
            ))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("Cols")))
            .map_err(xml_err)?;

        let cols = [
            row.tree_path.clone(),
            row.column.clone(),
            row.day_number.to_string(),
            row.value.to_string(),
            row.description.clone(),
        ];
        for (j, text) in cols.iter().enumerate() {
            let col_num = (j + 1).to_string();
            writer
                .write_event(Event::Start(
                    BytesStart::new("Col").with_attributes([("num", col_num.as_str())]),
                ))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("Col")))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("Cols")))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("Row")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("Rows")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("ExcelData")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

/// Read the job id from an upload submission response (`intStatus="202"`).
pub fn parse_upload_ack(body: &str) -> Result<String> {
    let root = parse_document(body)?;
    match root.attr("intStatus") {
        Some(STATUS_ACCEPTED) => root
            .attr("jobID")
            .map(String::from)
            .ok_or_else(|| LimError::Upload("accepted upload carries no jobID".into())),
        Some(other) => Err(LimError::Upload(format!(
            "upload not accepted (intStatus {other})"
        ))),
        None => Err(LimError::Upload(format!(
            "<{}> has no intStatus attribute",
            root.name
        ))),
    }
}

/// `<status><code>` and `<message>` of a job report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub code: String,
    pub message: String,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        self.code == JOB_SUCCESS || self.code == JOB_SUCCESS_WITH_WARNING
    }
}

pub fn parse_job_report(body: &str) -> Result<JobStatus> {
    let root = parse_document(body)?;
    let status = root.child("status");
    let field = |name: &str| {
        status
            .and_then(|s| s.child(name))
            .map(|e| e.text.trim().to_string())
            .unwrap_or_default()
    };
    Ok(JobStatus {
        code: field("code"),
        message: field("message"),
    })
}

/// Result of a completed upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSummary {
    pub batches: usize,
    pub rows: usize,
    pub job_ids: Vec<String>,
    pub messages: Vec<String>,
}

pub struct Uploader<T: Transport> {
    transport: T,
    config: LimConfig,
    policy: PollPolicy,
}

impl<T: Transport> Uploader<T> {
    pub fn new(transport: T, config: LimConfig, policy: PollPolicy) -> Self {
        Self {
            transport,
            config,
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// POST one batch; returns the accepted job id.
    pub fn submit(&self, rows: &[UploadRow]) -> Result<String> {
        let url = self.config.upload_url();
        let body = build_upload_xml(rows)?;
        tracing::info!(url = %url, rows = rows.len(), "uploading batch");
        let response = self
            .transport
            .post(&url, CONTENT_TYPE_TEXT_XML, &body)?
            .require_ok()?;
        parse_upload_ack(&response.body)
    }

    pub fn check_status(&self, job_id: &str) -> Result<JobStatus> {
        let response = self
            .transport
            .get(&self.config.upload_status_url(job_id))?
            .require_ok()?;
        parse_job_report(&response.body)
    }

    /// Poll until the job reports success; other codes keep polling.
    pub fn wait_for_job(&self, job_id: &str) -> Result<JobStatus> {
        self.policy.run(|attempt| {
            let status = self.check_status(job_id)?;
            if status.code == JOB_SUCCESS {
                return Ok(Poll::Ready(status));
            }
            tracing::warn!(job_id, attempt, code = %status.code, "problem with upload job: {}", status.message);
            if status.is_success() {
                Ok(Poll::Ready(status))
            } else {
                Ok(Poll::Pending)
            }
        })
    }

    /// Upload a whole table in batches of `UPLOAD_BATCH_ROWS` table rows.
    pub fn upload_series(&self, table: &SeriesTable, meta: &UploadMeta) -> Result<UploadSummary> {
        let mut summary = UploadSummary::default();
        for batch in table.chunks(UPLOAD_BATCH_ROWS) {
            let rows = rows_from_table(&batch, meta);
            if rows.is_empty() {
                continue;
            }
            let job_id = self.submit(&rows)?;
            let status = self.wait_for_job(&job_id)?;
            summary.batches += 1;
            summary.rows += rows.len();
            summary.job_ids.push(job_id);
            summary.messages.push(status.message);
        }
        Ok(summary)
    }
}
