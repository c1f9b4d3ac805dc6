//! Report parser: data-request responses into `SeriesTable`s.
//!
//! A response's root element carries `status` (embedded code, not the HTTP
//! status), an optional job `id` and an optional `statusMsg`. Completed
//! reports hold `ColumnHeadings`, `RowDates` and a flat `Values` list
//! ordered row-major (`rows × columns`).

use chrono::NaiveDateTime;

use crate::error::{LimError, Result};
use crate::table::{parse_timestamp, unique_column_names, SeriesTable};
use crate::xml::{parse_document, Element};

pub const STATUS_COMPLETE: i64 = 100;
pub const STATUS_NO_DATA: i64 = 130;
pub const STATUS_PENDING: i64 = 200;

/// Embedded request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Complete,
    NoData,
    Pending,
    Other(i64),
}

impl RequestStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            STATUS_COMPLETE => Self::Complete,
            STATUS_NO_DATA => Self::NoData,
            STATUS_PENDING => Self::Pending,
            other => Self::Other(other),
        }
    }
}

/// Raw report content in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub columns: Vec<String>,
    pub dates: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse {
    pub code: i64,
    pub status: RequestStatus,
    pub job_id: Option<u64>,
    pub message: Option<String>,
    pub report: Report,
}

/// Parse the body of a 200 response from the data-request endpoint.
pub fn parse_response(body: &str) -> Result<DataResponse> {
    let root = parse_document(body)?;

    let code = root
        .attr("status")
        .ok_or_else(|| LimError::Parse(format!("<{}> has no status attribute", root.name)))?;
    let code: i64 = code
        .trim()
        .parse()
        .map_err(|_| LimError::Parse(format!("status '{code}' is not an integer")))?;

    let job_id = root
        .attr("id")
        .map(|id| {
            id.trim()
                .parse::<u64>()
                .map_err(|_| LimError::Parse(format!("job id '{id}' is not an integer")))
        })
        .transpose()?;

    Ok(DataResponse {
        code,
        status: RequestStatus::from_code(code),
        job_id,
        message: root.attr("statusMsg").map(String::from),
        report: extract_report(&root)?,
    })
}

fn extract_report(root: &Element) -> Result<Report> {
    let texts = |tag: &str| -> Vec<String> {
        root.descendants(tag)
            .into_iter()
            .map(|e| e.text.trim().to_string())
            .collect()
    };

    let values = texts("Values")
        .into_iter()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| LimError::Parse(format!("value '{v}' is not a number")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Report {
        columns: texts("ColumnHeadings"),
        dates: texts("RowDates"),
        values,
    })
}

/// Group a flat value list into rows of `width` cells, in encounter order.
fn chunk_values(values: &[f64], width: usize) -> Vec<Vec<Option<f64>>> {
    values
        .chunks(width)
        .map(|row| row.iter().map(|v| (!v.is_nan()).then_some(*v)).collect())
        .collect()
}

/// Parse a server row stamp.
///
/// Accepts `YYYY-MM-DD`, ISO date-times (with or without offset, wall-clock
/// time kept), `YYYY-MM-DD HH:MM:SS`, `MM/DD/YYYY` and `YYYY/MM/DD`.
/// Bare dates land at midnight.
pub fn parse_row_time(text: &str) -> Result<NaiveDateTime> {
    parse_timestamp(text)
        .ok_or_else(|| LimError::Parse(format!("unrecognized row date '{}'", text.trim())))
}

/// Reshape a report into a table indexed by its row stamps.
///
/// Repeated column headings are suffixed (`X`, `X.1`, ...).
pub fn build_table(report: &Report) -> Result<SeriesTable> {
    let width = report.columns.len();

    let rows = if width == 0 {
        if !report.values.is_empty() {
            return Err(LimError::Parse(format!(
                "{} values but no column headings",
                report.values.len()
            )));
        }
        vec![Vec::new(); report.dates.len()]
    } else {
        if report.values.len() % width != 0 {
            return Err(LimError::Parse(format!(
                "{} values do not fill {width} columns",
                report.values.len()
            )));
        }
        chunk_values(&report.values, width)
    };

    if rows.len() != report.dates.len() {
        return Err(LimError::Parse(format!(
            "{} rows of values for {} row dates",
            rows.len(),
            report.dates.len()
        )));
    }

    let index = report
        .dates
        .iter()
        .map(|d| parse_row_time(d))
        .collect::<Result<Vec<_>>>()?;

    SeriesTable::new(unique_column_names(report.columns.clone()), index, rows)
}
