//! `LimClient`: the caller-facing facade.
//!
//! Owns the configuration, one transport, the disk cache and the two lookup
//! caches. Every read builds a query, runs it through a `RequestEngine` and
//! post-processes the table (aliases, curve resampling).

use chrono::{Datelike, Local, NaiveDate};

use crate::cache::QueryCache;
use crate::config::LimConfig;
use crate::contracts::{filter_by_year, is_monthly_contract, parse_contract_list};
use crate::engine::{PollPolicy, RequestEngine};
use crate::error::Result;
use crate::lookup::LookupCache;
use crate::query::{
    build_continuous_futures_rollover_query, build_curve_history_query, build_curve_query,
    build_series_query, RolloverSpec, Symbols,
};
use crate::table::{month_start, SeriesTable};
use crate::transport::{HttpTransport, Transport};
use crate::upload::{UploadMeta, UploadSummary, Uploader};

pub type ContractListCache = LookupCache<(String, bool), Vec<String>>;
pub type FuturesCache = LookupCache<(String, i32, i32), Option<SeriesTable>>;

pub struct LimClient<T: Transport = HttpTransport> {
    config: LimConfig,
    transport: T,
    policy: PollPolicy,
    cache: QueryCache,
    contract_lists: ContractListCache,
    futures: FuturesCache,
}

impl LimClient<HttpTransport> {
    /// Client over HTTP. Fails on invalid configuration.
    pub fn new(config: LimConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> LimClient<T> {
    pub fn with_transport(config: LimConfig, transport: T) -> Self {
        Self {
            policy: config.poll_policy(),
            cache: QueryCache::new(config.cache_dir.clone()),
            contract_lists: LookupCache::default_lookup(),
            futures: LookupCache::default_lookup(),
            config,
            transport,
        }
    }

    /// Replace the memoization caches, e.g. with `LookupCache::disabled()`.
    pub fn with_lookup_caches(mut self, contract_lists: ContractListCache, futures: FuturesCache) -> Self {
        self.contract_lists = contract_lists;
        self.futures = futures;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &LimConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn engine(&self) -> RequestEngine<&T> {
        RequestEngine::new(&self.transport, self.config.datarequests_url(), self.policy)
    }

    /// Run raw query text. `Ok(None)` when the server has no data.
    pub fn query(&self, query: &str) -> Result<Option<SeriesTable>> {
        self.engine().execute(query)
    }

    /// Run raw query text through the incremental disk cache.
    pub fn query_cached(&self, query: &str) -> Result<Option<SeriesTable>> {
        let engine = self.engine();
        self.cache.fetch(query, |q| engine.execute(q))
    }

    pub fn series(&self, symbols: impl Into<Symbols>) -> Result<Option<SeriesTable>> {
        let symbols = symbols.into();
        let query = build_series_query(&symbols.names())?;
        Ok(self.query(&query)?.map(|t| symbols.apply_aliases(t)))
    }

    /// Forward curve(s) from the current month onward, one row per month start.
    ///
    /// No dates asks for the latest curve, one date for the curve as of that
    /// day, several dates for a curve history of the first symbol.
    pub fn curve(
        &self,
        symbols: impl Into<Symbols>,
        column: &str,
        curve_dates: &[NaiveDate],
    ) -> Result<Option<SeriesTable>> {
        self.curve_as_of(symbols, column, curve_dates, Local::now().date_naive())
    }

    /// `curve` with an explicit "today".
    pub fn curve_as_of(
        &self,
        symbols: impl Into<Symbols>,
        column: &str,
        curve_dates: &[NaiveDate],
        today: NaiveDate,
    ) -> Result<Option<SeriesTable>> {
        let symbols = symbols.into();
        let names = symbols.names();
        let query = match curve_dates {
            [] => build_curve_query(&names, column, None)?,
            [as_of] => build_curve_query(&names, column, Some(*as_of))?,
            dates => build_curve_history_query(&names, column, dates)?,
        };
        let Some(table) = self.query(&query)? else {
            return Ok(None);
        };
        let table = symbols
            .apply_aliases(table)
            .since(month_start(today))
            .resample_month_start();
        Ok(Some(table))
    }

    pub fn continuous_futures_rollover(&self, spec: &RolloverSpec) -> Result<Option<SeriesTable>> {
        let query = build_continuous_futures_rollover_query(spec)?;
        self.query(&query)
    }

    /// Contracts listed under `symbol`, memoized per `(symbol, monthly_only)`.
    pub fn contract_list(&self, symbol: &str, monthly_only: bool) -> Result<Vec<String>> {
        self.contract_lists
            .get_or_try_insert((symbol.to_string(), monthly_only), || {
                let url = self.config.relations_url(symbol);
                let response = self.transport.get(&url)?.require_ok()?;
                let mut contracts = parse_contract_list(&response.body)?;
                if monthly_only {
                    contracts.retain(|c| is_monthly_contract(c));
                }
                tracing::debug!(symbol, count = contracts.len(), "contract list");
                Ok(contracts)
            })
    }

    /// Series of the monthly contracts of `symbol` expiring in `[start_year, end_year]`.
    pub fn futures_contracts(
        &self,
        symbol: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Option<SeriesTable>> {
        self.futures
            .get_or_try_insert((symbol.to_string(), start_year, end_year), || {
                let contracts = self.contract_list(symbol, true)?;
                let selected = filter_by_year(&contracts, start_year, end_year);
                if selected.is_empty() {
                    tracing::info!(symbol, start_year, end_year, "no contracts in year range");
                    return Ok(None);
                }
                self.series(selected)
            })
    }

    /// `futures_contracts` for the current year through two years ahead.
    pub fn futures_contracts_default(&self, symbol: &str) -> Result<Option<SeriesTable>> {
        let year = Local::now().year();
        self.futures_contracts(symbol, year, year + 2)
    }

    pub fn upload_series(&self, table: &SeriesTable, meta: &UploadMeta) -> Result<UploadSummary> {
        Uploader::new(&self.transport, self.config.clone(), self.policy).upload_series(table, meta)
    }
}
