//! Query builder: turns symbols, columns, curve dates and rollover rules into
//! query-language text. Pure: no I/O, no clock reads.
//!
//! The grammar has three clauses:
//! - `LET`: attribute definitions (`ATTR x1 = forward_curve(...)`, `M2 = SYM(...)`)
//! - `SHOW`: output column aliases (`name: expr`)
//! - `WHEN`: row gating (`x1 is DEFINED OR`, `Date is after 2024`)

use chrono::{Datelike, NaiveDate};
use std::fmt;

use crate::error::{LimError, Result};
use crate::table::SeriesTable;

/// Column used by forward-curve queries when none is given.
pub const DEFAULT_COLUMN: &str = "Close";

pub const DEFAULT_ROLLOVER_DATE: &str = "5 days before expiration day";

/// Curve date sentinel meaning "most recent curve".
pub const LAST_CURVE: &str = "LAST";

/// Date format understood by the server inside query text.
pub const QUERY_DATE_FORMAT: &str = "%m/%d/%Y";

/// Label format for curve-history output columns.
pub const CURVE_LABEL_FORMAT: &str = "%Y/%m/%d";

const DATE_LOWER_BOUND: &str = "date is after";

/// Symbols requested by a read operation.
///
/// A scalar becomes a one-element list. `Aliased` keeps an ordered
/// symbol → alias mapping; the query uses the symbols and the result columns
/// are renamed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbols {
    List(Vec<String>),
    Aliased(Vec<(String, String)>),
}

impl Symbols {
    pub fn aliased<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Aliased(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Symbols as sent to the server, in caller order.
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::List(names) => names.clone(),
            Self::Aliased(pairs) => pairs.iter().map(|(s, _)| s.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(names) => names.len(),
            Self::Aliased(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rename result columns when an alias mapping was supplied.
    pub fn apply_aliases(&self, table: SeriesTable) -> SeriesTable {
        match self {
            Self::List(_) => table,
            Self::Aliased(pairs) => table.renamed(pairs),
        }
    }
}

impl From<&str> for Symbols {
    fn from(symbol: &str) -> Self {
        Self::List(vec![symbol.to_string()])
    }
}

impl From<String> for Symbols {
    fn from(symbol: String) -> Self {
        Self::List(vec![symbol])
    }
}

impl From<Vec<String>> for Symbols {
    fn from(symbols: Vec<String>) -> Self {
        Self::List(symbols)
    }
}

impl From<Vec<&str>> for Symbols {
    fn from(symbols: Vec<&str>) -> Self {
        Self::List(symbols.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Symbols {
    fn from(symbols: &[&str]) -> Self {
        Self::List(symbols.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Symbols {
    fn from(symbols: [&str; N]) -> Self {
        Self::List(symbols.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<(String, String)>> for Symbols {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::Aliased(pairs)
    }
}

/// Lower bound in a rollover query's `WHEN` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterDate {
    Year(i32),
    Day(NaiveDate),
}

impl fmt::Display for AfterDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::Day(date) => write!(f, "{}", date.format(QUERY_DATE_FORMAT)),
        }
    }
}

/// Parameters of a rolled continuous-futures request.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverSpec {
    pub symbol: String,
    /// Forward months as `M1`, `M2`, ...
    pub months: Vec<String>,
    pub rollover_date: String,
    pub after: AfterDate,
}

impl RolloverSpec {
    /// Front month only, default rollover rule, data after the year before `today`.
    pub fn new(symbol: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            months: vec!["M1".to_string()],
            rollover_date: DEFAULT_ROLLOVER_DATE.to_string(),
            after: AfterDate::Year(today.year() - 1),
        }
    }

    pub fn months<I, S>(mut self, months: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.months = months.into_iter().map(Into::into).collect();
        self
    }

    pub fn rollover_date(mut self, rule: impl Into<String>) -> Self {
        self.rollover_date = rule.into();
        self
    }

    pub fn after(mut self, after: AfterDate) -> Self {
        self.after = after;
        self
    }
}

fn require_symbols(symbols: &[String]) -> Result<()> {
    if symbols.is_empty() {
        return Err(LimError::Query("at least one symbol is required".into()));
    }
    Ok(())
}

/// `Show` followed by one `SYM: SYM` line per symbol.
pub fn build_series_query(symbols: &[String]) -> Result<String> {
    require_symbols(symbols)?;
    let mut query = String::from("Show \n");
    for symbol in symbols {
        query.push_str(&format!("{symbol}: {symbol}\n"));
    }
    Ok(query)
}

fn let_show_when(lets: &str, shows: &str, whens: &str) -> String {
    format!("\nLET\n{lets}SHOW\n{shows}WHEN\n{whens}")
}

fn forward_curve_attr(index: usize, symbol: &str, column: &str, curve_date: &str) -> String {
    format!(
        "ATTR x{index} = forward_curve({symbol},\"{column}\",\"{curve_date}\",\"\",\"\",\"days\",\"\",0 day ago)\n"
    )
}

fn defined_clause(index: usize, total: usize) -> String {
    if total > 1 && index != total {
        format!("x{index} is DEFINED OR\n")
    } else {
        format!("x{index} is DEFINED\n")
    }
}

/// Forward curve per symbol as of `as_of` (latest curve when `None`).
///
/// Rows are kept when any symbol has a value (`WHEN` clauses are OR-joined).
pub fn build_curve_query(
    symbols: &[String],
    column: &str,
    as_of: Option<NaiveDate>,
) -> Result<String> {
    require_symbols(symbols)?;
    let curve_date = as_of
        .map(|d| d.format(QUERY_DATE_FORMAT).to_string())
        .unwrap_or_else(|| LAST_CURVE.to_string());

    let (mut lets, mut shows, mut whens) = (String::new(), String::new(), String::new());
    for (i, symbol) in symbols.iter().enumerate() {
        let n = i + 1;
        lets.push_str(&forward_curve_attr(n, symbol, column, &curve_date));
        shows.push_str(&format!("{symbol}: x{n}\n"));
        whens.push_str(&defined_clause(n, symbols.len()));
    }
    Ok(let_show_when(&lets, &shows, &whens))
}

/// One forward curve per historical date, for the first symbol only.
///
/// Output columns are labelled with the curve date (`YYYY/MM/DD`).
pub fn build_curve_history_query(
    symbols: &[String],
    column: &str,
    curve_dates: &[NaiveDate],
) -> Result<String> {
    require_symbols(symbols)?;
    if curve_dates.is_empty() {
        return Err(LimError::Query("curve history needs at least one date".into()));
    }
    let symbol = &symbols[0];

    let (mut lets, mut shows, mut whens) = (String::new(), String::new(), String::new());
    for (i, date) in curve_dates.iter().enumerate() {
        let n = i + 1;
        let query_date = date.format(QUERY_DATE_FORMAT).to_string();
        lets.push_str(&forward_curve_attr(n, symbol, column, &query_date));
        shows.push_str(&format!("{}: x{n}\n", date.format(CURVE_LABEL_FORMAT)));
        whens.push_str(&defined_clause(n, curve_dates.len()));
    }
    Ok(let_show_when(&lets, &shows, &whens))
}

/// Parse `M<n>` into `n` (n >= 1).
pub fn parse_month(label: &str) -> Result<u32> {
    let digits = label
        .strip_prefix('M')
        .or_else(|| label.strip_prefix('m'))
        .ok_or_else(|| LimError::Query(format!("month '{label}' must look like M1, M2, ...")))?;
    match digits.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(LimError::Query(format!(
            "month '{label}' must look like M1, M2, ..."
        ))),
    }
}

/// Name of the rollover policy for forward month `n`.
pub fn rollover_policy(n: u32) -> String {
    if n == 1 {
        "actual prices".to_string()
    } else {
        format!("{n} nearby actual prices")
    }
}

pub fn build_continuous_futures_rollover_query(spec: &RolloverSpec) -> Result<String> {
    if spec.symbol.is_empty() {
        return Err(LimError::Query("rollover query needs a symbol".into()));
    }
    if spec.months.is_empty() {
        return Err(LimError::Query("rollover query needs at least one month".into()));
    }

    let mut lets = String::new();
    let mut shows = String::new();
    let whens = format!("Date is after {}\n", spec.after);
    for month in &spec.months {
        let n = parse_month(month)?;
        lets.push_str(&format!(
            "M{n} = {}(ROLLOVER_DATE = \"{}\",ROLLOVER_POLICY = \"{}\")\n",
            spec.symbol,
            spec.rollover_date,
            rollover_policy(n)
        ));
        shows.push_str(&format!("M{n}: M{n}\n"));
    }
    Ok(let_show_when(&lets, &shows, &whens))
}

/// Whether the query already restricts dates from below.
pub fn has_date_lower_bound(query: &str) -> bool {
    query.to_ascii_lowercase().contains(DATE_LOWER_BOUND)
}

/// Append a `when date is after MM/DD/YYYY` gate.
pub fn with_date_lower_bound(query: &str, after: NaiveDate) -> String {
    format!(
        "{query} when {DATE_LOWER_BOUND} {}",
        after.format(QUERY_DATE_FORMAT)
    )
}
