//! The instruments example: a fixed sequence of read-only queries, each
//! printed to the given writer. A failed query is logged and the sequence
//! moves on; cancellation skips whatever has not run yet.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::{Client, ServiceError};
use crate::config::{self, Config};
use crate::contract::{InstrumentStatus, timestamp_to_utc};
use crate::instruments::{InstrumentsApi, InstrumentsServiceClient};
use crate::logging;

pub const SHARE_UID: &str = "6afa6f80-03a7-4d83-9cf0-c19d7d021f76";
pub const BOND_FIGI: &str = "BBG00QXGFHS6";
pub const SCHEDULE_EXCHANGE: &str = "MOEX";
pub const BOND_DISPLAY_LIMIT: usize = 5;

#[derive(Debug, Parser)]
#[command(about = "Query instrument metadata, schedules and corporate events")]
pub struct RunnerArgs {
    /// YAML file with EndPoint / APIToken / AppName.
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,
    /// Overrides LogLevel from the config file.
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    FindByTicker,
    FindByName,
    TradingSchedules,
    ShareByUid,
    Bonds,
    BondByFigi,
    AccruedInterests,
    BondCoupons,
    Dividends,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::FindByTicker,
        Step::FindByName,
        Step::TradingSchedules,
        Step::ShareByUid,
        Step::Bonds,
        Step::BondByFigi,
        Step::AccruedInterests,
        Step::BondCoupons,
        Step::Dividends,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Step::FindByTicker => "find instrument TCSG",
            Step::FindByName => "find instrument Тинькофф",
            Step::TradingSchedules => "trading schedules",
            Step::ShareByUid => "share by uid",
            Step::Bonds => "bonds",
            Step::BondByFigi => "bond by figi",
            Step::AccruedInterests => "accrued interests",
            Step::BondCoupons => "bond coupons",
            Step::Dividends => "dividends",
        }
    }
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("writing output: {0}")]
    Output(#[from] std::io::Error),
}

/// Outcome counts of one run; `skipped` covers steps lost to cancellation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Something that hands out an instruments handle and must be released
/// once the queries are done.
#[allow(async_fn_in_trait)]
pub trait Connection {
    type Instruments: InstrumentsApi;

    fn instruments(&self) -> Self::Instruments;

    async fn stop(self) -> Result<()>;
}

impl Connection for Client {
    type Instruments = InstrumentsServiceClient;

    fn instruments(&self) -> InstrumentsServiceClient {
        Client::instruments(self)
    }

    async fn stop(self) -> Result<()> {
        Client::stop(self).await
    }
}

/// Startup (config, logger, client) followed by the query session.
/// Any startup failure is returned before a query is issued.
pub async fn run(args: &RunnerArgs) -> Result<RunReport> {
    let config = Config::load(&args.config)?;
    let level = match &args.log_level {
        Some(level) => config::parse_level(level)?,
        None => config.level()?,
    };
    logging::init(level)?;

    let cancel = CancellationToken::new();
    cancel_on_signals(cancel.clone());

    let client = Client::connect(&config, cancel.clone()).await?;
    let mut stdout = std::io::stdout();
    let report = run_session(client, &cancel, Utc::now(), &mut stdout).await;
    info!(
        "done: {} succeeded, {} failed, {} skipped",
        report.succeeded, report.failed, report.skipped
    );
    Ok(report)
}

/// Runs every step against `conn` and then stops it, whether the steps
/// completed or were cancelled.
pub async fn run_session<C, W>(
    conn: C,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
    out: &mut W,
) -> RunReport
where
    C: Connection,
    W: Write,
{
    let instruments = conn.instruments();
    let report = run_queries(&instruments, cancel, now, out).await;
    drop(instruments);
    if let Err(e) = conn.stop().await {
        error!("client shutdown error {e:#}");
    }
    report
}

pub async fn run_queries<S, W>(
    svc: &S,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
    out: &mut W,
) -> RunReport
where
    S: InstrumentsApi,
    W: Write,
{
    let mut report = RunReport::default();
    for (i, step) in Step::ALL.into_iter().enumerate() {
        if cancel.is_cancelled() {
            warn!("cancelled, skipping {} remaining queries", Step::ALL.len() - i);
            report.skipped = Step::ALL.len() - i;
            break;
        }
        match run_step(step, svc, now, out).await {
            Ok(()) => report.succeeded += 1,
            Err(StepError::Service(ServiceError::Cancelled)) => {
                warn!("{} cancelled, skipping remaining queries", step.label());
                report.skipped = Step::ALL.len() - i;
                break;
            }
            Err(e) => {
                error!("{}: {e}", step.label());
                report.failed += 1;
            }
        }
    }
    report
}

async fn run_step<S, W>(
    step: Step,
    svc: &S,
    now: DateTime<Utc>,
    out: &mut W,
) -> Result<(), StepError>
where
    S: InstrumentsApi,
    W: Write,
{
    match step {
        Step::FindByTicker => {
            let resp = svc.find_instrument("TCSG").await?;
            for instrument in &resp.instruments {
                writeln!(out, "query TCSG - {}", instrument.name)?;
            }
        }
        Step::FindByName => {
            let resp = svc.find_instrument("Тинькофф").await?;
            for instrument in &resp.instruments {
                writeln!(
                    out,
                    "query Тинькофф - {}, uid - {}",
                    instrument.name, instrument.uid
                )?;
            }
        }
        Step::TradingSchedules => {
            let resp = svc
                .trading_schedules(SCHEDULE_EXCHANGE, now, now + Duration::hours(24))
                .await?;
            for exchange in &resp.exchanges {
                let days: Vec<String> = exchange.days.iter().map(|d| d.summary()).collect();
                writeln!(out, "{} days = [{}]", exchange.exchange, days.join(", "))?;
            }
        }
        Step::ShareByUid => {
            let share = svc
                .share_by_uid(SHARE_UID)
                .await?
                .instrument
                .unwrap_or_default();
            let ipo = share
                .ipo_date_utc()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            writeln!(
                out,
                "{} share currency - {}, ipo date - {}",
                share.ticker, share.currency, ipo
            )?;
        }
        Step::Bonds => {
            let resp = svc.bonds(InstrumentStatus::Base).await?;
            for (i, bond) in resp.instruments.iter().take(BOND_DISPLAY_LIMIT).enumerate() {
                writeln!(out, "bond {i} = {}", bond.figi)?;
            }
        }
        Step::BondByFigi => {
            let resp = svc.bond_by_figi(BOND_FIGI).await?;
            writeln!(out, "bond by figi = {:?}", resp.instrument.unwrap_or_default())?;
        }
        Step::AccruedInterests => {
            let resp = svc
                .get_accrued_interests(SHARE_UID, now - Duration::hours(72), now)
                .await?;
            for interest in &resp.accrued_interests {
                let value = interest.value.map(|v| v.to_f64()).unwrap_or_default();
                writeln!(out, "Interest = {value}")?;
            }
        }
        Step::BondCoupons => {
            let resp = svc
                .get_bond_coupons(SHARE_UID, now, now + Duration::hours(10_000))
                .await?;
            for coupon in &resp.events {
                let date = coupon.coupon_date.as_ref().map(timestamp_to_utc);
                writeln!(out, "coupon date = {}", display_date(date))?;
            }
        }
        Step::Dividends => {
            match svc
                .get_dividends(SHARE_UID, now - Duration::hours(1_000), now)
                .await
            {
                Ok(resp) => {
                    for (i, dividend) in resp.dividends.iter().enumerate() {
                        let date = dividend.declared_date.as_ref().map(timestamp_to_utc);
                        writeln!(out, "dividend {i}, declared date = {}", display_date(date))?;
                    }
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        writeln!(
                            out,
                            "header msg = {}",
                            e.header("message").unwrap_or_default()
                        )?;
                    }
                    return Err(e.into());
                }
            }
        }
    }
    Ok(())
}

fn display_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Cancels `token` on Ctrl+C or SIGTERM.
pub fn cancel_on_signals(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("received Ctrl+C, cancelling"),
            () = terminate => info!("received SIGTERM, cancelling"),
            () = token.cancelled() => return,
        }
        token.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{
        AccruedInterest, Bond, BondResponse, BondsResponse, Coupon, Dividend,
        FindInstrumentResponse, GetAccruedInterestsResponse, GetBondCouponsResponse,
        GetDividendsResponse, InstrumentShort, Quotation, Share, ShareResponse, TradingDay,
        TradingSchedule, TradingSchedulesResponse,
    };
    use prost_types::Timestamp;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::rc::Rc;
    use tonic::metadata::MetadataValue;

    const REFUSED_CONFIG: &str = "APIToken: t\nEndPoint: http://127.0.0.1:9\nConnectTimeout: 1\n";

    #[derive(Default)]
    struct FakeState {
        calls: RefCell<Vec<&'static str>>,
        ranges: RefCell<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
        failing: HashSet<&'static str>,
        timeout_at: Option<&'static str>,
        cancel_at: Option<(&'static str, CancellationToken)>,
        bond_count: usize,
    }

    #[derive(Clone, Default)]
    struct FakeInstruments(Rc<FakeState>);

    impl FakeInstruments {
        fn with(state: FakeState) -> Self {
            Self(Rc::new(state))
        }

        fn with_bonds(bond_count: usize) -> Self {
            Self::with(FakeState {
                bond_count,
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<&'static str> {
            self.0.calls.borrow().clone()
        }

        fn enter(&self, name: &'static str) -> Result<(), ServiceError> {
            self.0.calls.borrow_mut().push(name);
            if let Some((at, token)) = &self.0.cancel_at {
                if *at == name {
                    token.cancel();
                    return Err(ServiceError::Cancelled);
                }
            }
            if self.0.timeout_at == Some(name) {
                return Err(tonic::Status::cancelled("Timeout expired").into());
            }
            if self.0.failing.contains(name) {
                let mut status = tonic::Status::unavailable(format!("{name} unavailable"));
                status
                    .metadata_mut()
                    .insert("message", MetadataValue::from_static("try later"));
                return Err(status.into());
            }
            Ok(())
        }

        fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) {
            self.0.ranges.borrow_mut().push((from, to));
        }
    }

    fn ts(seconds: i64) -> Option<Timestamp> {
        Some(Timestamp { seconds, nanos: 0 })
    }

    impl InstrumentsApi for FakeInstruments {
        async fn find_instrument(
            &self,
            query: &str,
        ) -> Result<FindInstrumentResponse, ServiceError> {
            self.enter("find_instrument")?;
            Ok(FindInstrumentResponse {
                instruments: vec![
                    InstrumentShort {
                        name: format!("{query} A"),
                        uid: "uid-a".into(),
                        ..Default::default()
                    },
                    InstrumentShort {
                        name: format!("{query} B"),
                        uid: "uid-b".into(),
                        ..Default::default()
                    },
                ],
            })
        }

        async fn trading_schedules(
            &self,
            exchange: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<TradingSchedulesResponse, ServiceError> {
            self.enter("trading_schedules")?;
            self.range(from, to);
            Ok(TradingSchedulesResponse {
                exchanges: vec![TradingSchedule {
                    exchange: exchange.to_string(),
                    days: vec![TradingDay {
                        date: ts(1_700_000_000),
                        is_trading_day: false,
                        ..Default::default()
                    }],
                }],
            })
        }

        async fn share_by_uid(&self, uid: &str) -> Result<ShareResponse, ServiceError> {
            self.enter("share_by_uid")?;
            Ok(ShareResponse {
                instrument: Some(Share {
                    uid: uid.to_string(),
                    ticker: "TCSG".into(),
                    currency: "rub".into(),
                    ipo_date: ts(1_382_659_200),
                    ..Default::default()
                }),
            })
        }

        async fn bonds(&self, status: InstrumentStatus) -> Result<BondsResponse, ServiceError> {
            self.enter("bonds")?;
            assert_eq!(status, InstrumentStatus::Base);
            Ok(BondsResponse {
                instruments: (0..self.0.bond_count)
                    .map(|i| Bond {
                        figi: format!("FIGI{i}"),
                        ..Default::default()
                    })
                    .collect(),
            })
        }

        async fn bond_by_figi(&self, figi: &str) -> Result<BondResponse, ServiceError> {
            self.enter("bond_by_figi")?;
            Ok(BondResponse {
                instrument: Some(Bond {
                    figi: figi.to_string(),
                    ..Default::default()
                }),
            })
        }

        async fn get_accrued_interests(
            &self,
            _instrument_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<GetAccruedInterestsResponse, ServiceError> {
            self.enter("get_accrued_interests")?;
            self.range(from, to);
            Ok(GetAccruedInterestsResponse {
                accrued_interests: vec![AccruedInterest {
                    value: Some(Quotation {
                        units: 12,
                        nano: 500_000_000,
                    }),
                    ..Default::default()
                }],
            })
        }

        async fn get_bond_coupons(
            &self,
            _instrument_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<GetBondCouponsResponse, ServiceError> {
            self.enter("get_bond_coupons")?;
            self.range(from, to);
            Ok(GetBondCouponsResponse {
                events: vec![Coupon {
                    coupon_date: ts(1_700_000_000),
                    ..Default::default()
                }],
            })
        }

        async fn get_dividends(
            &self,
            _instrument_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<GetDividendsResponse, ServiceError> {
            self.enter("get_dividends")?;
            self.range(from, to);
            Ok(GetDividendsResponse {
                dividends: vec![Dividend {
                    declared_date: ts(1_700_000_000),
                    ..Default::default()
                }],
            })
        }
    }

    struct FakeConnection {
        instruments: FakeInstruments,
        stops: Rc<Cell<usize>>,
    }

    impl FakeConnection {
        fn new(instruments: FakeInstruments) -> (Self, Rc<Cell<usize>>) {
            let stops = Rc::new(Cell::new(0));
            let conn = Self {
                instruments,
                stops: stops.clone(),
            };
            (conn, stops)
        }
    }

    impl Connection for FakeConnection {
        type Instruments = FakeInstruments;

        fn instruments(&self) -> FakeInstruments {
            self.instruments.clone()
        }

        async fn stop(self) -> Result<()> {
            self.stops.set(self.stops.get() + 1);
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn counts(succeeded: usize, failed: usize, skipped: usize) -> RunReport {
        RunReport {
            succeeded,
            failed,
            skipped,
        }
    }

    async fn run_to_string(svc: &FakeInstruments) -> (RunReport, String) {
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let report = run_queries(svc, &cancel, now(), &mut out).await;
        (report, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn all_steps_run_in_order() {
        let svc = FakeInstruments::with_bonds(2);
        let (report, out) = run_to_string(&svc).await;

        assert_eq!(report, counts(9, 0, 0));
        assert_eq!(
            svc.calls(),
            vec![
                "find_instrument",
                "find_instrument",
                "trading_schedules",
                "share_by_uid",
                "bonds",
                "bond_by_figi",
                "get_accrued_interests",
                "get_bond_coupons",
                "get_dividends",
            ]
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "query TCSG - TCSG A");
        assert_eq!(lines[1], "query TCSG - TCSG B");
        assert_eq!(lines[2], "query Тинькофф - Тинькофф A, uid - uid-a");
        assert_eq!(lines[4], "MOEX days = [2023-11-14 closed]");
        assert!(lines[5].starts_with("TCSG share currency - rub, ipo date - 2013-10-25"));
        assert_eq!(lines[6], "bond 0 = FIGI0");
        assert!(out.contains("Interest = 12.5"));
        assert!(out.contains("coupon date = 2023-11-14 22:13:20 UTC"));
        assert!(out.contains("dividend 0, declared date = 2023-11-14 22:13:20 UTC"));
    }

    #[tokio::test]
    async fn failed_steps_do_not_stop_the_sequence() {
        let svc = FakeInstruments::with(FakeState {
            failing: HashSet::from(["find_instrument", "bonds", "get_dividends"]),
            ..Default::default()
        });
        let (report, out) = run_to_string(&svc).await;

        assert_eq!(report, counts(5, 4, 0));
        assert_eq!(svc.calls().len(), 9);
        assert_eq!(svc.calls().last(), Some(&"get_dividends"));
        assert!(!out.contains("query TCSG"));
        assert!(out.contains("bond by figi"));
        assert!(out.contains("header msg = try later"));
    }

    #[tokio::test]
    async fn bond_listing_is_capped() {
        let svc = FakeInstruments::with_bonds(40);
        let (_, out) = run_to_string(&svc).await;

        let bonds: Vec<&str> = out
            .lines()
            .filter(|l| l.starts_with("bond ") && !l.starts_with("bond by"))
            .collect();
        assert_eq!(bonds.len(), BOND_DISPLAY_LIMIT);
        assert_eq!(bonds.last(), Some(&"bond 4 = FIGI4"));
    }

    #[tokio::test]
    async fn query_ranges_are_derived_from_now() {
        let svc = FakeInstruments::default();
        run_to_string(&svc).await;

        let ranges = svc.0.ranges.borrow().clone();
        assert_eq!(
            ranges,
            vec![
                (now(), now() + Duration::hours(24)),
                (now() - Duration::hours(72), now()),
                (now(), now() + Duration::hours(10_000)),
                (now() - Duration::hours(1_000), now()),
            ]
        );
    }

    #[tokio::test]
    async fn share_lookup_echoes_the_uid() {
        let svc = FakeInstruments::default();
        let resp = svc.share_by_uid(SHARE_UID).await.unwrap();
        assert_eq!(resp.instrument.unwrap().uid, SHARE_UID);
    }

    #[tokio::test]
    async fn repeated_runs_print_the_same_output() {
        let svc = FakeInstruments::with_bonds(7);
        let (_, first) = run_to_string(&svc).await;
        let (_, second) = run_to_string(&svc).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cancellation_skips_the_rest_and_still_stops_once() {
        let cancel = CancellationToken::new();
        let svc = FakeInstruments::with(FakeState {
            cancel_at: Some(("share_by_uid", cancel.clone())),
            ..Default::default()
        });
        let (conn, stops) = FakeConnection::new(svc.clone());

        let mut out = Vec::new();
        let report = run_session(conn, &cancel, now(), &mut out).await;

        assert_eq!(report, counts(3, 0, 6));
        assert_eq!(svc.calls().last(), Some(&"share_by_uid"));
        assert_eq!(stops.get(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_issues_no_query() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let svc = FakeInstruments::default();
        let (conn, stops) = FakeConnection::new(svc.clone());

        let report = run_session(conn, &cancel, now(), &mut Vec::new()).await;

        assert_eq!(report.skipped, Step::ALL.len());
        assert!(svc.calls().is_empty());
        assert_eq!(stops.get(), 1);
    }

    #[tokio::test]
    async fn normal_session_stops_once() {
        let (conn, stops) = FakeConnection::new(FakeInstruments::default());
        let cancel = CancellationToken::new();
        let report = run_session(conn, &cancel, now(), &mut Vec::new()).await;
        assert_eq!(report.succeeded, Step::ALL.len());
        assert_eq!(stops.get(), 1);
    }

    #[tokio::test]
    async fn missing_config_fails_before_connecting() {
        let args = RunnerArgs {
            config: PathBuf::from("/nonexistent/config.yaml"),
            log_level: None,
        };
        let err = run(&args).await.unwrap_err();
        assert!(format!("{err:#}").contains("reading config"));
    }

    #[tokio::test]
    async fn logger_failure_fails_before_connecting() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REFUSED_CONFIG.as_bytes()).unwrap();
        let _ = logging::init(tracing::Level::INFO);

        let args = RunnerArgs {
            config: file.path().to_path_buf(),
            log_level: None,
        };
        let err = run(&args).await.unwrap_err();
        assert!(format!("{err:#}").contains("logger creating error"));
    }

    #[tokio::test]
    async fn request_timeout_fails_only_its_step() {
        let svc = FakeInstruments::with(FakeState {
            timeout_at: Some("trading_schedules"),
            ..Default::default()
        });
        let (report, out) = run_to_string(&svc).await;

        assert_eq!(report, counts(8, 1, 0));
        assert_eq!(svc.calls().len(), Step::ALL.len());
        assert!(!out.contains("MOEX days"));
        assert!(out.contains("dividend 0"));
    }

    #[tokio::test]
    async fn timed_out_dividends_still_print_header_line() {
        let svc = FakeInstruments::with(FakeState {
            timeout_at: Some("get_dividends"),
            ..Default::default()
        });
        let (report, out) = run_to_string(&svc).await;

        assert_eq!(report, counts(8, 1, 0));
        assert!(out.ends_with("header msg = \n"));
    }
}
