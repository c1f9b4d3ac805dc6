//! End-to-end client behaviour against scripted servers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use limkit_core::testing::{
    complete_body, no_data_body, pending_body, Method, RecordedRequest, ScriptedTransport,
};
use limkit_core::transport::HttpResponse;
use limkit_core::{LimClient, LimConfig, LimError, PollPolicy, RolloverSpec, Symbols};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn config() -> LimConfig {
    LimConfig::new("https://lim.test/", "user", "secret")
}

fn client(transport: ScriptedTransport) -> LimClient<ScriptedTransport> {
    LimClient::with_transport(config(), transport).with_poll_policy(PollPolicy::immediate(50))
}

// ── Polling ──────────────────────────────────────────────────────────

#[test]
fn pending_pending_complete_resolves() {
    let c = client(ScriptedTransport::new([
        HttpResponse::ok(pending_body(42)),
        HttpResponse::ok(pending_body(42)),
        HttpResponse::ok(complete_body(&["FB"], &["2024-01-02T00:00:00"], &[77.5])),
    ]));
    let t = c.query("Show \nFB: FB\n").unwrap().unwrap();
    assert_eq!(t.get(d(2024, 1, 2), "FB"), Some(77.5));

    let requests = c.transport().requests();
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].url, "https://lim.test/rs/api/datarequests");
    assert_eq!(requests[1].url, "https://lim.test/rs/api/datarequests/42");
    assert_eq!(requests[2].url, "https://lim.test/rs/api/datarequests/42");
}

#[test]
fn all_pending_runs_out_of_tries() {
    let c = LimClient::with_transport(
        config(),
        ScriptedTransport::with_handler(|_| HttpResponse::ok(pending_body(7))),
    )
    .with_poll_policy(PollPolicy::immediate(6));
    let err = c.query("Show \nFB: FB\n").unwrap_err();
    assert!(matches!(err, LimError::TriesExhausted { tries: 6 }));
    assert_eq!(c.transport().request_count(), 6);
}

#[test]
fn http_error_while_polling_is_transport_error() {
    let c = client(ScriptedTransport::new([
        HttpResponse::ok(pending_body(42)),
        HttpResponse {
            status: 503,
            body: "service unavailable".into(),
        },
        HttpResponse::ok(complete_body(&["FB"], &["2024-01-02"], &[1.0])),
    ]));
    let err = c.query("Show \nFB: FB\n").unwrap_err();
    assert!(matches!(err, LimError::Transport { status: 503, .. }));

    let requests = c.transport().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].method, Method::Get);
    assert_eq!(requests[1].url, "https://lim.test/rs/api/datarequests/42");
}

#[test]
fn no_data_yields_none() {
    let c = client(ScriptedTransport::new([HttpResponse::ok(no_data_body())]));
    assert!(c.series("NOPE").unwrap().is_none());
}

// ── Series / aliases ─────────────────────────────────────────────────

#[test]
fn series_of_two_symbols_reshapes_row_major_values() {
    let c = client(ScriptedTransport::new([HttpResponse::ok(complete_body(
        &["FB", "FP"],
        &["2020-01-02", "2020-01-03"],
        &[1.0, 2.0, 3.0, 4.0],
    ))]));
    let t = c.series(vec!["FB", "FP"]).unwrap().unwrap();
    assert_eq!(t.height(), 2);
    assert_eq!(t.column("FB"), Some(vec![Some(1.0), Some(3.0)]));
    assert_eq!(t.column("FP"), Some(vec![Some(2.0), Some(4.0)]));
    assert_eq!(t.dates(), &[d(2020, 1, 2), d(2020, 1, 3)]);
}

#[test]
fn alias_mapping_renames_only_mapped_columns() {
    let body = complete_body(
        &["FP_2020J", "FB_2020J"],
        &["2020-01-02"],
        &[608.5, 65.56],
    );
    let plain = client(ScriptedTransport::new([HttpResponse::ok(body.clone())]))
        .series(["FP_2020J", "FB_2020J"])
        .unwrap()
        .unwrap();
    let aliased = client(ScriptedTransport::new([HttpResponse::ok(body)]))
        .series(Symbols::aliased([("FP_2020J", "GO")]))
        .unwrap()
        .unwrap();

    assert_eq!(aliased.columns(), &["GO".to_string(), "FB_2020J".to_string()]);
    assert_eq!(aliased.get(d(2020, 1, 2), "GO"), Some(608.5));
    assert_eq!(aliased.get(d(2020, 1, 2), "FB_2020J"), Some(65.56));
    assert_eq!(aliased.rows(), plain.rows());
    assert_eq!(aliased.dates(), plain.dates());
}

#[test]
fn rollover_query_is_sent_verbatim() {
    let c = client(ScriptedTransport::new([HttpResponse::ok(complete_body(
        &["M1", "M2"],
        &["2024-01-02"],
        &[80.0, 79.5],
    ))]));
    let spec = RolloverSpec::new("FB", d(2024, 6, 1)).months(["M1", "M2"]);
    let t = c.continuous_futures_rollover(&spec).unwrap().unwrap();
    assert_eq!(t.width(), 2);

    let body = c.transport().requests()[0].body.clone().unwrap();
    assert!(body.contains("M2 = FB(ROLLOVER_DATE = \"5 days before expiration day\",ROLLOVER_POLICY = \"2 nearby actual prices\")"));
    assert!(body.contains("Date is after 2023"));
}

// ── Curves ───────────────────────────────────────────────────────────

#[test]
fn curve_history_labels_columns_by_curve_date() {
    let c = client(ScriptedTransport::new([HttpResponse::ok(complete_body(
        &["2024/01/02", "2024/02/01"],
        &["2024-02-01", "2024-03-01", "2024-03-20", "2024-05-01"],
        &[70.0, 71.0, 72.0, 73.0, 74.0, 75.0, 76.0, 77.0],
    ))]));
    let t = c
        .curve_as_of(
            ["FB", "FP"],
            "Close",
            &[d(2024, 1, 2), d(2024, 2, 1)],
            d(2024, 3, 10),
        )
        .unwrap()
        .unwrap();

    let body = c.transport().requests()[0].body.clone().unwrap();
    assert!(body.contains("forward_curve(FB,\"Close\",\"01/02/2024\""));
    assert!(body.contains("forward_curve(FB,\"Close\",\"02/01/2024\""));
    assert!(!body.contains("FP"));
    assert!(body.contains("2024/01/02: x1\n2024/02/01: x2\n"));

    assert_eq!(t.columns(), &["2024/01/02".to_string(), "2024/02/01".to_string()]);
    assert_eq!(t.dates(), &[d(2024, 3, 1), d(2024, 4, 1), d(2024, 5, 1)]);
    assert_eq!(t.column("2024/01/02"), Some(vec![Some(73.0), None, Some(76.0)]));
    assert_eq!(t.column("2024/02/01"), Some(vec![Some(74.0), None, Some(77.0)]));
}

// ── Incremental cache ────────────────────────────────────────────────

/// Server whose history grows by five days per call and which honours a
/// trailing `date is after MM/DD/YYYY` bound. Values carry the call number so
/// overlapping rows can be told apart.
fn growing_server(calls: Arc<AtomicUsize>) -> ScriptedTransport {
    ScriptedTransport::with_handler(move |req: &RecordedRequest| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let text = req.body.as_deref().unwrap_or_default();
        let after = text
            .split("date is after ")
            .nth(1)
            .and_then(|rest| rest.get(..10))
            .and_then(|s| NaiveDate::parse_from_str(s, "%m/%d/%Y").ok());

        let visible = 10 + 5 * n as i64;
        let dates: Vec<NaiveDate> = (0..visible)
            .map(|i| d(2024, 1, 1) + Duration::days(i))
            .filter(|date| after.map_or(true, |a| *date > a))
            .collect();
        let labels: Vec<String> = dates.iter().map(|x| x.format("%Y-%m-%d").to_string()).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        let values: Vec<f64> = dates
            .iter()
            .map(|x| x.ordinal() as f64 + n as f64 * 0.5)
            .collect();
        HttpResponse::ok(complete_body(&["FB"], &labels, &values))
    })
}

#[test]
fn cached_query_fetches_incrementally_and_merges() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.cache_dir = dir.path().to_path_buf();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = LimClient::with_transport(cfg, growing_server(calls.clone()))
        .with_poll_policy(PollPolicy::immediate(5));
    let q = "Show \nFB: FB\n";

    let first = c.query_cached(q).unwrap().unwrap();
    assert_eq!(first.height(), 10);
    assert_eq!(first.last_date(), Some(d(2024, 1, 10)));

    let second = c.query_cached(q).unwrap().unwrap();
    let sent = c.transport().requests()[1].body.clone().unwrap();
    assert!(sent.contains("when date is after 01/05/2024"));

    assert!(second.last_date() >= first.last_date());
    assert_eq!(second.last_date(), Some(d(2024, 1, 15)));
    let unique: HashSet<_> = second.index().iter().collect();
    assert_eq!(unique.len(), second.height());
    assert_eq!(second.height(), 15);
    // overlap rows come from the fresh fetch
    assert_eq!(second.get(d(2024, 1, 6), "FB"), Some(6.5));
    assert_eq!(second.get(d(2024, 1, 5), "FB"), Some(5.0));

    let entries = c.cache().status().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].meta.row_count, 15);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn cached_query_with_explicit_bound_is_not_rebounded() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.cache_dir = dir.path().to_path_buf();
    let c = LimClient::with_transport(cfg, growing_server(Arc::new(AtomicUsize::new(0))))
        .with_poll_policy(PollPolicy::immediate(5));
    let q = "Show \nFB: FB\nWhen Date is after 01/03/2024";

    c.query_cached(q).unwrap().unwrap();
    c.query_cached(q).unwrap().unwrap();
    let sent = c.transport().requests()[1].body.clone().unwrap();
    assert_eq!(sent.to_ascii_lowercase().matches("date is after").count(), 1);
}
