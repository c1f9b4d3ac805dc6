//! limkit CLI: query, lookup, upload and cache management commands.
//!
//! Commands:
//! - `series` / `curve` / `rollover`: build and run a query, print the table as CSV
//! - `query`: run raw query text, optionally through the incremental cache
//! - `contracts` / `futures`: list contracts of a symbol, fetch their series
//! - `upload`: send a CSV table to the ingestion endpoint
//! - `cache status` / `cache clear`: inspect or empty the query cache
//!
//! Credentials come from `--config <file.toml>` when given, else from
//! `LIMSERVER`, `LIMUSERNAME` and `LIMPASSWORD`.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use limkit_core::cache::QueryCache;
use limkit_core::query::DEFAULT_COLUMN;
use limkit_core::{AfterDate, LimClient, LimConfig, RolloverSpec, SeriesTable, Symbols, UploadMeta};

#[derive(Parser)]
#[command(name = "limkit", about = "limkit CLI: market-data query client")]
struct Cli {
    /// TOML configuration file. Defaults to environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the resulting table here instead of stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily series for one or more symbols.
    Series {
        /// Symbols, optionally renamed with `SYMBOL=ALIAS`.
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Forward curves from the current month onward, resampled to month starts.
    Curve {
        /// Symbols, optionally renamed with `SYMBOL=ALIAS`.
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Price column.
        #[arg(long, default_value = DEFAULT_COLUMN)]
        column: String,

        /// Curve date (YYYY-MM-DD). Repeat for a curve history of the first symbol.
        #[arg(long = "date")]
        dates: Vec<String>,
    },
    /// Rolled continuous futures.
    Rollover {
        symbol: String,

        /// Month labels: M1, M2, ...
        #[arg(long, default_values_t = vec!["M1".to_string()])]
        months: Vec<String>,

        /// Rollover rule understood by the server.
        #[arg(long)]
        rollover_date: Option<String>,

        /// Only rows after this year (YYYY) or day (YYYY-MM-DD). Defaults to last year.
        #[arg(long)]
        after: Option<String>,
    },
    /// Run raw query text.
    Query {
        /// Query text, or `@path` to read it from a file.
        text: String,

        /// Go through the incremental disk cache.
        #[arg(long, default_value_t = false)]
        cached: bool,
    },
    /// List contracts under a symbol.
    Contracts {
        symbol: String,

        /// Keep only monthly contracts.
        #[arg(long, default_value_t = false)]
        monthly: bool,

        /// Print as a JSON array.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Series of the monthly contracts expiring within a year range.
    Futures {
        symbol: String,

        /// First contract year. Defaults to the current year.
        #[arg(long)]
        start_year: Option<i32>,

        /// Last contract year. Defaults to two years ahead.
        #[arg(long)]
        end_year: Option<i32>,
    },
    /// Upload a CSV table (`date` column first, one column per tree path).
    Upload {
        csv: PathBuf,

        /// Description stored with every row.
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Query cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached queries with date ranges and sizes.
    Status {
        /// Cache directory. Defaults to the configured one.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Remove every cached query.
    Clear {
        /// Cache directory. Defaults to the configured one.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let out = cli.out.as_deref();

    match cli.command {
        Commands::Series { symbols } => {
            let client = connect(cli.config.as_deref())?;
            emit(client.series(parse_symbols(&symbols))?, out)
        }
        Commands::Curve {
            symbols,
            column,
            dates,
        } => {
            let client = connect(cli.config.as_deref())?;
            let dates = dates
                .iter()
                .map(|s| parse_date(s))
                .collect::<Result<Vec<_>>>()?;
            emit(client.curve(parse_symbols(&symbols), &column, &dates)?, out)
        }
        Commands::Rollover {
            symbol,
            months,
            rollover_date,
            after,
        } => {
            let client = connect(cli.config.as_deref())?;
            let mut spec = RolloverSpec::new(symbol, today()).months(months);
            if let Some(rule) = rollover_date {
                spec = spec.rollover_date(rule);
            }
            if let Some(after) = after {
                spec = spec.after(parse_after(&after)?);
            }
            emit(client.continuous_futures_rollover(&spec)?, out)
        }
        Commands::Query { text, cached } => {
            let client = connect(cli.config.as_deref())?;
            let text = match text.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("reading query from {path}"))?,
                None => text,
            };
            let table = if cached {
                client.query_cached(&text)?
            } else {
                client.query(&text)?
            };
            emit(table, out)
        }
        Commands::Contracts {
            symbol,
            monthly,
            json,
        } => {
            let client = connect(cli.config.as_deref())?;
            let contracts = client.contract_list(&symbol, monthly)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&contracts)?);
            } else {
                for c in &contracts {
                    println!("{c}");
                }
            }
            Ok(())
        }
        Commands::Futures {
            symbol,
            start_year,
            end_year,
        } => {
            let client = connect(cli.config.as_deref())?;
            let start = start_year.unwrap_or_else(|| today().year());
            let end = end_year.unwrap_or(start + 2);
            if end < start {
                bail!("--end-year {end} is before --start-year {start}");
            }
            emit(client.futures_contracts(&symbol, start, end)?, out)
        }
        Commands::Upload { csv, description } => {
            let client = connect(cli.config.as_deref())?;
            let file = File::open(&csv).with_context(|| format!("opening {}", csv.display()))?;
            let table = SeriesTable::read_csv(file)?;
            if table.is_empty() {
                bail!("{} has no rows", csv.display());
            }
            let summary = client.upload_series(&table, &UploadMeta::with_description(description))?;
            println!(
                "Uploaded {} value(s) in {} batch(es): jobs {}",
                summary.rows,
                summary.batches,
                summary.job_ids.join(", ")
            );
            Ok(())
        }
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => {
                run_cache_status(&resolve_cache_dir(cli.config.as_deref(), cache_dir)?)
            }
            CacheAction::Clear { cache_dir, confirm } => {
                run_cache_clear(&resolve_cache_dir(cli.config.as_deref(), cache_dir)?, confirm)
            }
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<LimConfig> {
    let config = match path {
        Some(path) => LimConfig::from_file(path)?,
        None => LimConfig::from_env()
            .context("set LIMSERVER, LIMUSERNAME and LIMPASSWORD or pass --config")?,
    };
    Ok(config)
}

fn connect(config: Option<&Path>) -> Result<LimClient> {
    let config = load_config(config)?;
    tracing::debug!(?config, "loaded configuration");
    Ok(LimClient::new(config)?)
}

fn resolve_cache_dir(config: Option<&Path>, explicit: Option<PathBuf>) -> Result<PathBuf> {
    match (explicit, config) {
        (Some(dir), _) => Ok(dir),
        (None, Some(path)) => Ok(LimConfig::from_file(path)?.cache_dir),
        (None, None) => Ok(PathBuf::from(".")),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}' (want YYYY-MM-DD)"))
}

fn parse_after(s: &str) -> Result<AfterDate> {
    if s.len() == 4 {
        if let Ok(year) = s.parse() {
            return Ok(AfterDate::Year(year));
        }
    }
    Ok(AfterDate::Day(parse_date(s)?))
}

/// `FB FP=GO` → aliased when any argument carries `=`.
fn parse_symbols(args: &[String]) -> Symbols {
    if !args.iter().any(|a| a.contains('=')) {
        return Symbols::List(args.to_vec());
    }
    Symbols::aliased(args.iter().map(|a| match a.split_once('=') {
        Some((symbol, alias)) => (symbol.to_string(), alias.to_string()),
        None => (a.clone(), a.clone()),
    }))
}

fn emit(table: Option<SeriesTable>, out: Option<&Path>) -> Result<()> {
    let Some(table) = table else {
        eprintln!("No data.");
        return Ok(());
    };
    match out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            table.write_csv(file)?;
            eprintln!("Wrote {} row(s) to {}", table.height(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            table.write_csv(&mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    let cache = QueryCache::new(cache_dir);
    let entries = cache.status()?;
    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();

    println!("Cache: {}", cache_dir.display());
    println!("Entries: {}", entries.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!("{:<34} {:<25} {:>8} {:>10}", "Key", "Date Range", "Rows", "Size");
    println!("{}", "-".repeat(80));
    for entry in &entries {
        let range = match (entry.meta.start_date, entry.meta.end_date) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ => "-".to_string(),
        };
        println!(
            "{:<34} {:<25} {:>8} {:>10}",
            entry.key,
            range,
            entry.meta.row_count,
            format_size(entry.size_bytes)
        );
    }
    Ok(())
}

fn run_cache_clear(cache_dir: &Path, confirm: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }
    let cache = QueryCache::new(cache_dir);
    let entries = cache.status()?;
    if entries.is_empty() {
        println!("No cached queries with metadata; leftover files will still be removed.");
    } else {
        println!("Found {} cached query(ies):", entries.len());
        for entry in &entries {
            println!("  {} ({})", entry.key, format_size(entry.size_bytes));
        }
    }

    if !confirm {
        println!();
        println!("Dry run: pass --confirm to actually delete.");
        return Ok(());
    }

    let removed = cache.clear()?;
    println!("Done. Removed {removed} cache file(s) (data, metadata and leftovers).");
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_without_aliases_stay_a_list() {
        let s = parse_symbols(&["FB".into(), "FP".into()]);
        assert_eq!(s, Symbols::List(vec!["FB".into(), "FP".into()]));
    }

    #[test]
    fn alias_arguments_build_mapping() {
        let s = parse_symbols(&["FB=Brent".into(), "FP".into()]);
        assert_eq!(
            s,
            Symbols::Aliased(vec![
                ("FB".into(), "Brent".into()),
                ("FP".into(), "FP".into())
            ])
        );
    }

    #[test]
    fn after_accepts_year_or_day() {
        assert_eq!(parse_after("2023").unwrap(), AfterDate::Year(2023));
        assert_eq!(
            parse_after("2023-06-30").unwrap(),
            AfterDate::Day(NaiveDate::from_ymd_opt(2023, 6, 30).unwrap())
        );
        assert!(parse_after("June").is_err());
    }

    #[test]
    fn cli_parses_curve_dates() {
        let cli = Cli::try_parse_from([
            "limkit", "curve", "FB", "--date", "2024-01-02", "--date", "2024-02-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Curve { symbols, column, dates } => {
                assert_eq!(symbols, vec!["FB"]);
                assert_eq!(column, "Close");
                assert_eq!(dates.len(), 2);
            }
            _ => panic!("expected curve"),
        }
    }
}
