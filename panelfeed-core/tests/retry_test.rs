//! Retry semantics of the remote query wrapper against a scripted session.

use chrono::NaiveDate;
use panelfeed_core::data::provider::{
    DataError, QueryOptions, QuoteSession, RemoteResponse, SeriesRequest,
};
use panelfeed_core::data::retry::{Backoff, QueryOutcome, RemoteFailure, RetryPolicy, RetryingQuery};
use panelfeed_core::domain::{Instrument, RawColumn, RawTable};
use std::collections::VecDeque;

/// Replays a fixed script of responses and counts every call.
struct ScriptedSession {
    script: VecDeque<Result<RemoteResponse<RawTable>, DataError>>,
    calls: usize,
}

impl ScriptedSession {
    fn new(script: Vec<Result<RemoteResponse<RawTable>, DataError>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }
}

impl QuoteSession for ScriptedSession {
    fn name(&self) -> &str {
        "scripted"
    }
    fn start(&mut self) -> Result<(), DataError> {
        Ok(())
    }
    fn is_connected(&self) -> bool {
        true
    }
    fn close(&mut self) {}
    fn series(&mut self, _: &SeriesRequest) -> Result<RemoteResponse<RawTable>, DataError> {
        self.calls += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(DataError::NetworkUnreachable("script exhausted".into())))
    }
    fn constituents(
        &mut self,
        _: &str,
        _: NaiveDate,
    ) -> Result<RemoteResponse<Vec<String>>, DataError> {
        Ok(RemoteResponse::ok(Vec::new()))
    }
}

fn request() -> SeriesRequest {
    SeriesRequest {
        instrument: Instrument::new("000001.SZ").unwrap(),
        fields: vec!["CLOSE".into()],
        start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        options: QueryOptions::market_unadjusted(),
    }
}

fn table() -> RawTable {
    RawTable::new(
        vec![NaiveDate::from_ymd_opt(2023, 1, 3).unwrap()],
        vec![RawColumn::new("CLOSE", vec![Some(10.0)])],
    )
    .unwrap()
}

fn transient() -> Result<RemoteResponse<RawTable>, DataError> {
    Ok(RemoteResponse::error(-40520010))
}

#[test]
fn succeeds_on_last_allowed_attempt() {
    let mut session = ScriptedSession::new(vec![
        transient(),
        Err(DataError::NetworkUnreachable("reset".into())),
        Ok(RemoteResponse::ok(table())),
    ]);
    let query = RetryingQuery::new(RetryPolicy::immediate(3));

    let outcome = query.fetch(&mut session, &request());
    assert_eq!(outcome, QueryOutcome::Data(table()));
    assert_eq!(session.calls, 3);
}

#[test]
fn no_data_short_circuits_after_one_call() {
    let mut session = ScriptedSession::new(vec![
        Ok(RemoteResponse::no_data()),
        Ok(RemoteResponse::ok(table())),
    ]);
    let query = RetryingQuery::new(RetryPolicy::immediate(5));

    assert_eq!(query.fetch(&mut session, &request()), QueryOutcome::NoData);
    assert_eq!(session.calls, 1);
}

#[test]
fn exhaustion_is_a_value_not_an_error() {
    let mut session = ScriptedSession::new(vec![transient(), transient(), transient(), transient()]);
    let query = RetryingQuery::new(RetryPolicy::immediate(3));

    match query.fetch(&mut session, &request()) {
        QueryOutcome::Unavailable {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("-40520010"), "got: {last_error}");
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(session.calls, 3);
}

#[test]
fn non_retryable_failure_stops_immediately() {
    fn status_only(failure: &RemoteFailure) -> bool {
        matches!(failure, RemoteFailure::Status { .. })
    }

    let mut session = ScriptedSession::new(vec![
        Err(DataError::ResponseFormatChanged("bad json".into())),
        Ok(RemoteResponse::ok(table())),
    ]);
    let query = RetryingQuery::new(RetryPolicy::immediate(4).with_predicate(status_only));

    let outcome = query.fetch(&mut session, &request());
    assert!(matches!(outcome, QueryOutcome::Unavailable { attempts: 1, .. }));
    assert_eq!(session.calls, 1);
}

#[test]
fn zero_attempts_still_queries_once() {
    let mut session = ScriptedSession::new(vec![Ok(RemoteResponse::ok(table()))]);
    let query = RetryingQuery::new(RetryPolicy::new(0, Backoff::None));

    assert!(matches!(
        query.fetch(&mut session, &request()),
        QueryOutcome::Data(_)
    ));
    assert_eq!(session.calls, 1);
}

#[test]
fn policy_is_not_mutated_by_fetching() {
    let policy = RetryPolicy::immediate(2);
    let query = RetryingQuery::new(policy.clone());
    let mut session = ScriptedSession::new(vec![transient(), transient()]);

    let _ = query.fetch(&mut session, &request());
    assert_eq!(query.policy().max_attempts, policy.max_attempts);
    assert_eq!(query.policy().backoff, policy.backoff);
}
