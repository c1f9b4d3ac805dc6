//! Timestamp-indexed numeric table returned by every read operation.
//!
//! Rows are keyed by `NaiveDateTime`; date-only values sit at midnight, so daily
//! and intraday series share one representation. Cells are `Option<f64>`: `None`
//! means the server emitted no value for that row/column combination.
//! Conversions to Polars (for the Parquet cache) and CSV (for the CLI) live here
//! as well.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};

use crate::error::{LimError, Result};

/// Header of the index column in CSV renderings.
pub const INDEX_COLUMN: &str = "date";

/// Index column of the Parquet frame; no data column may use this name.
pub const FRAME_INDEX_COLUMN: &str = "__limkit_index";

const CSV_DATE_FORMAT: &str = "%Y-%m-%d";
const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// A row key: timestamps as-is, plain dates at midnight.
pub trait RowTime: Copy {
    fn row_time(self) -> NaiveDateTime;
}

impl RowTime for NaiveDateTime {
    fn row_time(self) -> NaiveDateTime {
        self
    }
}

impl RowTime for NaiveDate {
    fn row_time(self) -> NaiveDateTime {
        midnight(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    columns: Vec<String>,
    index: Vec<NaiveDateTime>,
    rows: Vec<Vec<Option<f64>>>,
}

impl SeriesTable {
    /// Build a table, checking that every row has one cell per column and
    /// that column names are unique.
    pub fn new(
        columns: Vec<String>,
        index: Vec<NaiveDateTime>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if index.len() != rows.len() {
            return Err(LimError::Parse(format!(
                "{} row timestamps for {} rows",
                index.len(),
                rows.len()
            )));
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(LimError::Parse(format!(
                "row {i} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        check_column_names(&columns)?;
        Ok(Self {
            columns,
            index,
            rows,
        })
    }

    /// `new` for date-only rows, each placed at midnight.
    pub fn from_dates(
        columns: Vec<String>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        Self::new(columns, dates.into_iter().map(midnight).collect(), rows)
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns: unique_column_names(columns),
            index: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    /// Calendar date of each row.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.index.iter().map(|t| t.date()).collect()
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.iter().min().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.iter().max().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_timestamp().map(|t| t.date())
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value at `(at, column)`; `None` when either is missing or the cell is absent.
    pub fn get(&self, at: impl RowTime, column: &str) -> Option<f64> {
        let at = at.row_time();
        let col = self.column_index(column)?;
        let row = self.index.iter().position(|t| *t == at)?;
        self.rows[row][col]
    }

    pub fn column(&self, column: &str) -> Option<Vec<Option<f64>>> {
        let col = self.column_index(column)?;
        Some(self.rows.iter().map(|row| row[col]).collect())
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = (NaiveDateTime, &[Option<f64>])> + '_ {
        self.index
            .iter()
            .copied()
            .zip(self.rows.iter().map(|r| r.as_slice()))
    }

    /// Rename columns found in `mapping`; columns not mentioned keep their name.
    /// A rename that would collide gets a `.N` suffix.
    pub fn renamed(mut self, mapping: &[(String, String)]) -> Self {
        for column in &mut self.columns {
            if let Some((_, alias)) = mapping.iter().find(|(from, _)| from == column) {
                *column = alias.clone();
            }
        }
        self.columns = unique_column_names(self.columns);
        self
    }

    /// Rows stamped at or after `from`; a date means its midnight.
    pub fn since(self, from: impl RowTime) -> Self {
        let from = from.row_time();
        let (index, rows) = self
            .index
            .into_iter()
            .zip(self.rows)
            .filter(|(at, _)| *at >= from)
            .unzip();
        Self {
            columns: self.columns,
            index,
            rows,
        }
    }

    /// Combine a cached table with freshly fetched rows.
    ///
    /// Columns are the union (this table's order first). Rows are keyed by
    /// timestamp; for a timestamp present in both, the fresh row wins, so exact
    /// duplicates collapse and late corrections replace stale values. Output is
    /// time-sorted.
    pub fn merge(self, fresh: SeriesTable) -> SeriesTable {
        let mut columns = self.columns.clone();
        for c in &fresh.columns {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }

        let mut by_time: BTreeMap<NaiveDateTime, Vec<Option<f64>>> = BTreeMap::new();
        for table in [self, fresh] {
            let positions: Vec<usize> = table
                .columns
                .iter()
                .map(|c| columns.iter().position(|m| m == c).unwrap_or_default())
                .collect();
            for (at, row) in table.index.into_iter().zip(table.rows) {
                let mut merged = vec![None; columns.len()];
                for (cell, &pos) in row.into_iter().zip(&positions) {
                    merged[pos] = cell;
                }
                by_time.insert(at, merged);
            }
        }

        let (index, rows) = by_time.into_iter().unzip();
        SeriesTable {
            columns,
            index,
            rows,
        }
    }

    /// Month-start resampling: one midnight row per calendar month between the
    /// first and last row, each cell the mean of the values present in that month.
    pub fn resample_month_start(&self) -> SeriesTable {
        let (Some(first), Some(last)) = (self.first_timestamp(), self.last_timestamp()) else {
            return SeriesTable::empty(self.columns.clone());
        };

        let mut buckets: BTreeMap<NaiveDate, Vec<(f64, usize)>> = BTreeMap::new();
        let mut month = month_start(first.date());
        let end = month_start(last.date());
        while month <= end {
            buckets.insert(month, vec![(0.0, 0); self.columns.len()]);
            month = next_month(month);
        }

        for (at, row) in self.iter_rows() {
            if let Some(acc) = buckets.get_mut(&month_start(at.date())) {
                for (slot, cell) in acc.iter_mut().zip(row) {
                    if let Some(v) = cell {
                        slot.0 += v;
                        slot.1 += 1;
                    }
                }
            }
        }

        let (index, rows) = buckets
            .into_iter()
            .map(|(month, acc)| {
                let row = acc
                    .into_iter()
                    .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
                    .collect();
                (midnight(month), row)
            })
            .unzip();
        SeriesTable {
            columns: self.columns.clone(),
            index,
            rows,
        }
    }

    /// Split into consecutive tables of at most `size` rows.
    pub fn chunks(&self, size: usize) -> Vec<SeriesTable> {
        let size = size.max(1);
        self.index
            .chunks(size)
            .zip(self.rows.chunks(size))
            .map(|(index, rows)| SeriesTable {
                columns: self.columns.clone(),
                index: index.to_vec(),
                rows: rows.to_vec(),
            })
            .collect()
    }

    // ── Polars ──────────────────────────────────────────────────────

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let millis: Vec<i64> = self
            .index
            .iter()
            .map(|t| t.and_utc().timestamp_millis())
            .collect();

        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(
            Column::new(FRAME_INDEX_COLUMN.into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(|e| LimError::Cache(format!("timestamp cast: {e}")))?,
        );
        for (i, name) in self.columns.iter().enumerate() {
            let values: Vec<Option<f64>> = self.rows.iter().map(|row| row[i]).collect();
            columns.push(Column::new(name.as_str().into(), values));
        }

        DataFrame::new(columns).map_err(|e| LimError::Cache(format!("dataframe creation: {e}")))
    }

    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let map_err = |e: PolarsError| LimError::Cache(format!("column read: {e}"));

        let index_col = df.column(FRAME_INDEX_COLUMN).map_err(map_err)?;
        let unit = match index_col.dtype() {
            DataType::Datetime(unit, _) => *unit,
            other => {
                return Err(LimError::Cache(format!(
                    "index column has type {other}, expected datetime"
                )))
            }
        };
        let ts_ca = index_col
            .datetime()
            .map_err(|e| LimError::Cache(format!("index column type: {e}")))?;

        let mut index = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let value = ts_ca
                .get(i)
                .ok_or_else(|| LimError::Cache(format!("null timestamp at row {i}")))?;
            let at = timestamp_from_epoch(value, unit)
                .ok_or_else(|| LimError::Cache(format!("timestamp out of range at row {i}")))?;
            index.push(at);
        }

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| n != FRAME_INDEX_COLUMN)
            .collect();

        let mut rows = vec![Vec::with_capacity(names.len()); df.height()];
        for name in &names {
            let casted = df
                .column(name)
                .map_err(map_err)?
                .cast(&DataType::Float64)
                .map_err(map_err)?;
            let ca = casted
                .f64()
                .map_err(|e| LimError::Cache(format!("{name} column type: {e}")))?;
            for (i, row) in rows.iter_mut().enumerate() {
                row.push(ca.get(i));
            }
        }

        Self::new(names, index, rows)
    }

    // ── CSV ─────────────────────────────────────────────────────────

    /// Midnight rows print as `YYYY-MM-DD`, others as `YYYY-MM-DD HH:MM:SS`.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        let csv_err = |e: csv::Error| LimError::Cache(format!("csv write: {e}"));

        let header = std::iter::once(INDEX_COLUMN).chain(self.columns.iter().map(|c| c.as_str()));
        writer.write_record(header).map_err(csv_err)?;

        for (at, row) in self.iter_rows() {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(format_row_time(at));
            record.extend(row.iter().map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()));
            writer.write_record(&record).map_err(csv_err)?;
        }
        writer
            .flush()
            .map_err(|e| LimError::Cache(format!("csv flush: {e}")))
    }

    /// Read a CSV whose first column holds dates or timestamps.
    /// Repeated headings get a `.N` suffix.
    pub fn read_csv<R: Read>(input: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(input);
        let csv_err = |e: csv::Error| LimError::Parse(format!("csv read: {e}"));

        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .skip(1)
            .map(|h| h.trim().to_string())
            .collect();
        let columns = unique_column_names(columns);

        let mut index = Vec::new();
        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let raw = record.get(0).unwrap_or_default().trim();
            let at = parse_timestamp(raw).ok_or_else(|| {
                LimError::Parse(format!("csv row {}: bad date '{raw}'", line + 1))
            })?;
            let row = record
                .iter()
                .skip(1)
                .map(|cell| {
                    let cell = cell.trim();
                    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                        Ok(None)
                    } else {
                        cell.parse::<f64>().map(Some).map_err(|e| {
                            LimError::Parse(format!("csv row {}: bad value '{cell}': {e}", line + 1))
                        })
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            index.push(at);
            rows.push(row);
        }

        Self::new(columns, index, rows)
    }
}

/// Parse a row stamp: RFC 3339 or offset timestamps keep their wall-clock
/// time, naive timestamps are taken as-is and bare dates become midnight.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.naive_local());
    }
    if let Ok(t) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(t.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(midnight)
        })
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn format_row_time(at: NaiveDateTime) -> String {
    if at.time() == NaiveTime::MIN {
        at.format(CSV_DATE_FORMAT).to_string()
    } else {
        at.format(CSV_TIMESTAMP_FORMAT).to_string()
    }
}

fn timestamp_from_epoch(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let millis = match unit {
        TimeUnit::Nanoseconds => value.div_euclid(1_000_000),
        TimeUnit::Microseconds => value.div_euclid(1_000),
        TimeUnit::Milliseconds => value,
    };
    DateTime::from_timestamp_millis(millis).map(|t| t.naive_utc())
}

fn check_column_names(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for name in columns {
        if name == FRAME_INDEX_COLUMN {
            return Err(LimError::Parse(format!(
                "column name '{name}' is reserved for the row index"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(LimError::Parse(format!("duplicate column name '{name}'")));
        }
    }
    Ok(())
}

/// Make names unique: a repeat of `X` becomes `X.1`, `X.2`, ... in order of
/// appearance, skipping any suffix already taken. The reserved index name is
/// suffixed as well.
pub fn unique_column_names(columns: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(columns.len() + 1);
    taken.insert(FRAME_INDEX_COLUMN.to_string());
    let originals: HashSet<String> = columns.iter().cloned().collect();
    let mut out = Vec::with_capacity(columns.len());
    for name in columns {
        if taken.insert(name.clone()) {
            out.push(name);
            continue;
        }
        let mut n = 1;
        let renamed = loop {
            let candidate = format!("{name}.{n}");
            if !originals.contains(&candidate) && taken.insert(candidate.clone()) {
                break candidate;
            }
            n += 1;
        };
        out.push(renamed);
    }
    out
}

pub(crate) fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn next_month(month: NaiveDate) -> NaiveDate {
    let (year, m) = if month.month() == 12 {
        (month.year() + 1, 1)
    } else {
        (month.year(), month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, m, 1).unwrap_or(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(y: i32, m: u32, day: u32, h: u32, min: u32) -> NaiveDateTime {
        d(y, m, day).and_hms_opt(h, min, 0).unwrap()
    }

    fn intraday() -> SeriesTable {
        SeriesTable::new(
            vec!["FB".into()],
            vec![at(2024, 1, 2, 10, 0), at(2024, 1, 2, 11, 30), at(2024, 1, 3, 9, 0)],
            vec![vec![Some(1.0)], vec![Some(2.0)], vec![Some(3.0)]],
        )
        .unwrap()
    }

    fn sample() -> SeriesTable {
        SeriesTable::from_dates(
            vec!["FB".into(), "FP".into()],
            vec![d(2024, 1, 2), d(2024, 1, 3)],
            vec![vec![Some(1.0), Some(2.0)], vec![Some(3.0), None]],
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_ragged_rows() {
        let err = SeriesTable::from_dates(
            vec!["A".into()],
            vec![d(2024, 1, 2)],
            vec![vec![Some(1.0), Some(2.0)]],
        )
        .unwrap_err();
        assert!(matches!(err, LimError::Parse(_)));
    }

    #[test]
    fn get_and_column_lookup() {
        let t = sample();
        assert_eq!(t.get(d(2024, 1, 3), "FB"), Some(3.0));
        assert_eq!(t.get(d(2024, 1, 3), "FP"), None);
        assert_eq!(t.get(d(2024, 1, 3), "XX"), None);
        assert_eq!(t.column("FP"), Some(vec![Some(2.0), None]));
        assert_eq!(t.last_date(), Some(d(2024, 1, 3)));
    }

    #[test]
    fn renamed_touches_only_mapped_columns() {
        let t = sample().renamed(&[("FB".into(), "Brent".into())]);
        assert_eq!(t.columns(), &["Brent".to_string(), "FP".to_string()]);
        assert_eq!(t.get(d(2024, 1, 2), "Brent"), Some(1.0));
    }

    #[test]
    fn merge_prefers_fresh_rows_and_sorts() {
        let cached = sample();
        let fresh = SeriesTable::from_dates(
            vec!["FP".into(), "FB".into()],
            vec![d(2024, 1, 4), d(2024, 1, 3)],
            vec![vec![Some(9.0), Some(8.0)], vec![Some(4.0), Some(3.0)]],
        )
        .unwrap();

        let merged = cached.merge(fresh);
        assert_eq!(merged.columns(), &["FB".to_string(), "FP".to_string()]);
        assert_eq!(merged.dates(), &[d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)]);
        assert_eq!(merged.get(d(2024, 1, 3), "FP"), Some(4.0));
        assert_eq!(merged.get(d(2024, 1, 4), "FB"), Some(8.0));
    }

    #[test]
    fn merge_adds_new_columns() {
        let fresh = SeriesTable::from_dates(
            vec!["ZZ".into()],
            vec![d(2024, 1, 5)],
            vec![vec![Some(5.0)]],
        )
        .unwrap();
        let merged = sample().merge(fresh);
        assert_eq!(merged.width(), 3);
        assert_eq!(merged.get(d(2024, 1, 5), "FB"), None);
        assert_eq!(merged.get(d(2024, 1, 5), "ZZ"), Some(5.0));
    }

    #[test]
    fn resample_fills_missing_months() {
        let t = SeriesTable::from_dates(
            vec!["X".into()],
            vec![d(2024, 1, 10), d(2024, 1, 20), d(2024, 3, 5)],
            vec![vec![Some(1.0)], vec![Some(3.0)], vec![Some(7.0)]],
        )
        .unwrap();
        let m = t.resample_month_start();
        assert_eq!(m.dates(), &[d(2024, 1, 1), d(2024, 2, 1), d(2024, 3, 1)]);
        assert_eq!(m.column("X"), Some(vec![Some(2.0), None, Some(7.0)]));
    }

    #[test]
    fn since_drops_earlier_rows() {
        let t = sample().since(d(2024, 1, 3));
        assert_eq!(t.dates(), &[d(2024, 1, 3)]);
        assert_eq!(t.height(), 1);
    }

    #[test]
    fn chunks_split_rows() {
        let dates: Vec<NaiveDate> = (0..5).map(|i| d(2024, 1, 1) + chrono::Duration::days(i)).collect();
        let rows = (0..5).map(|i| vec![Some(i as f64)]).collect();
        let t = SeriesTable::from_dates(vec!["A".into()], dates, rows).unwrap();
        let sizes: Vec<usize> = t.chunks(2).iter().map(|c| c.height()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn dataframe_roundtrip_keeps_absent_cells() {
        let t = sample();
        let df = t.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        let back = SeriesTable::from_dataframe(&df).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn csv_roundtrip() {
        let t = sample();
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("date,FB,FP\n2024-01-02,1,2\n"));
        let back = SeriesTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn new_rejects_duplicate_and_reserved_columns() {
        let dup = SeriesTable::from_dates(
            vec!["FB".into(), "FB".into()],
            vec![d(2024, 1, 2)],
            vec![vec![Some(1.0), Some(2.0)]],
        )
        .unwrap_err();
        assert!(matches!(dup, LimError::Parse(ref m) if m.contains("duplicate column name 'FB'")));

        let reserved = SeriesTable::from_dates(
            vec![FRAME_INDEX_COLUMN.into()],
            vec![d(2024, 1, 2)],
            vec![vec![Some(1.0)]],
        )
        .unwrap_err();
        assert!(matches!(reserved, LimError::Parse(ref m) if m.contains("reserved")));
    }

    #[test]
    fn column_named_date_survives_dataframe_roundtrip() {
        let t = SeriesTable::from_dates(
            vec![INDEX_COLUMN.into(), "FB".into()],
            vec![d(2024, 1, 2)],
            vec![vec![Some(1.0), Some(2.0)]],
        )
        .unwrap();
        let back = SeriesTable::from_dataframe(&t.to_dataframe().unwrap()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn unique_names_suffix_repeats() {
        let names = unique_column_names(vec![
            "A".into(),
            "A".into(),
            "A.1".into(),
            "A".into(),
            FRAME_INDEX_COLUMN.into(),
        ]);
        assert_eq!(
            names,
            vec![
                "A".to_string(),
                "A.2".to_string(),
                "A.1".to_string(),
                "A.3".to_string(),
                format!("{FRAME_INDEX_COLUMN}.1"),
            ]
        );
    }

    #[test]
    fn colliding_rename_is_suffixed() {
        let t = sample().renamed(&[("FP".into(), "FB".into())]);
        assert_eq!(t.columns(), &["FB".to_string(), "FB.1".to_string()]);
        assert!(t.to_dataframe().is_ok());
    }

    #[test]
    fn csv_with_repeated_headings_reads() {
        let t = SeriesTable::read_csv("date,FB,FB\n2024-01-02,1,2\n".as_bytes()).unwrap();
        assert_eq!(t.columns(), &["FB".to_string(), "FB.1".to_string()]);
    }

    #[test]
    fn intraday_rows_keep_their_time() {
        let t = intraday();
        assert_eq!(t.height(), 3);
        assert_eq!(t.get(at(2024, 1, 2, 11, 30), "FB"), Some(2.0));
        assert_eq!(t.get(d(2024, 1, 2), "FB"), None);
        assert_eq!(t.last_timestamp(), Some(at(2024, 1, 3, 9, 0)));
        assert_eq!(t.last_date(), Some(d(2024, 1, 3)));
        assert_eq!(t.dates(), &[d(2024, 1, 2), d(2024, 1, 2), d(2024, 1, 3)]);
    }

    #[test]
    fn merge_keys_on_time_of_day() {
        let fresh = SeriesTable::new(
            vec!["FB".into()],
            vec![at(2024, 1, 2, 11, 30), at(2024, 1, 2, 12, 0)],
            vec![vec![Some(20.0)], vec![Some(25.0)]],
        )
        .unwrap();
        let merged = intraday().merge(fresh);
        assert_eq!(merged.height(), 4);
        assert_eq!(merged.get(at(2024, 1, 2, 10, 0), "FB"), Some(1.0));
        assert_eq!(merged.get(at(2024, 1, 2, 11, 30), "FB"), Some(20.0));
        assert_eq!(merged.get(at(2024, 1, 2, 12, 0), "FB"), Some(25.0));
        assert_eq!(merged.index()[3], at(2024, 1, 3, 9, 0));
    }

    #[test]
    fn since_compares_timestamps() {
        assert_eq!(intraday().since(at(2024, 1, 2, 11, 0)).height(), 2);
        assert_eq!(intraday().since(d(2024, 1, 2)).height(), 3);
    }

    #[test]
    fn resample_buckets_intraday_rows() {
        let m = intraday().resample_month_start();
        assert_eq!(m.index(), &[at(2024, 1, 1, 0, 0)]);
        assert_eq!(m.column("FB"), Some(vec![Some(2.0)]));
    }

    #[test]
    fn intraday_dataframe_and_csv_roundtrip() {
        let t = intraday();
        let back = SeriesTable::from_dataframe(&t.to_dataframe().unwrap()).unwrap();
        assert_eq!(back, t);

        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("2024-01-02 11:30:00,2\n"));
        assert_eq!(SeriesTable::read_csv(buf.as_slice()).unwrap(), t);
    }

    #[test]
    fn non_datetime_index_is_rejected() {
        let df = DataFrame::new(vec![Column::new(FRAME_INDEX_COLUMN.into(), vec![1i64, 2])]).unwrap();
        assert!(matches!(SeriesTable::from_dataframe(&df), Err(LimError::Cache(_))));
    }
}
