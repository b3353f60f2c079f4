//! Bounded-concurrency execution of a test corpus.
//!
//! Every case runs as its own task behind a counting semaphore; a hung or
//! failing request costs only its own slot. Failures of any kind land in the
//! case's Outcome, so a run always produces one Outcome per case, even when
//! every single one failed.

use anyhow::Result;
use apiprobe_core::TargetContext;
use corpus::TestCase;
use reqwest::{header, Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;

/// Longest raw-text response fragment kept on an outcome.
const BODY_SNIPPET_MAX: usize = 200;

/// What actually happened when one test case ran. Serializes losslessly so
/// result sets can be re-aggregated or replayed later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
    pub expected_status: u16,
    /// None when the transport itself failed (refused, timeout, DNS).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub success: bool,
    #[serde(default)]
    pub negative: bool,
    pub duration_ms: u64,
    /// Decoded JSON body, or the raw text truncated to a bounded length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

/// Summary counts and latency stats, recomputed from outcomes on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Percentage in 0..=100.
    pub success_rate: f64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::new())
}

/// Build the shared client for a target: timeout, user agent, and any
/// context headers applied to every request.
pub fn client(ctx: &TargetContext) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    for (k, v) in &ctx.headers {
        let name = header::HeaderName::from_bytes(k.as_bytes())?;
        headers.insert(name, header::HeaderValue::from_str(v)?);
    }
    let client = Client::builder()
        .timeout(ctx.timeout)
        .user_agent(ctx.user_agent.clone())
        .default_headers(headers)
        .build()?;
    Ok(client)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Execute one case and capture everything observable about it. An HTTP error
/// status is a normal outcome; only transport-level failures set `error`, and
/// those always count as failures regardless of the expected status.
pub async fn run_case(client: &Client, base_url: &str, case: &TestCase) -> Outcome {
    let url = format!("{}{}", base_url.trim_end_matches('/'), case.endpoint);
    let timestamp = now_rfc3339();
    let started = Instant::now();

    let method = Method::from_bytes(case.method.as_bytes()).unwrap_or(Method::GET);
    let mut request = client.request(method, url.as_str());
    if let Some(body) = &case.data {
        request = request.json(body);
    }

    let mut outcome = Outcome {
        name: case.name.clone(),
        description: case.description.clone(),
        endpoint: case.endpoint.clone(),
        method: case.method.clone(),
        url,
        request_data: case.data.clone(),
        expected_status: case.expected_status,
        status: None,
        success: false,
        negative: case.negative,
        duration_ms: 0,
        response: None,
        error: None,
        timestamp,
    };

    match request.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            outcome.status = Some(status);
            outcome.success = status == case.expected_status;
            if !text.is_empty() {
                outcome.response = Some(
                    serde_json::from_str::<Value>(&text)
                        .unwrap_or_else(|_| Value::String(truncate(&text, BODY_SNIPPET_MAX))),
                );
            }
            if outcome.success {
                tracing::debug!("{} -> {}", outcome.name, status);
            } else {
                tracing::info!(
                    "{} -> {} (expected {})",
                    outcome.name,
                    status,
                    case.expected_status
                );
            }
        }
        Err(e) => {
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            outcome.error = Some(e.to_string());
            tracing::info!("{} -> transport error: {}", outcome.name, e);
        }
    }
    outcome
}

/// Run a whole corpus against `base_url` with at most `concurrency` requests
/// in flight. Outcomes arrive in completion order; the corpus is a set of
/// independent probes, so no ordering is promised.
pub async fn execute(
    base_url: &str,
    cases: Vec<TestCase>,
    ctx: &TargetContext,
    concurrency: usize,
) -> Result<Vec<Outcome>> {
    let client = client(ctx)?;
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<Outcome>(cases.len().max(1));

    for case in cases {
        let tx = tx.clone();
        let client = client.clone();
        let base = base_url.to_string();
        let sem = sem.clone();
        tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.unwrap();
            let outcome = run_case(&client, &base, &case).await;
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    let mut outcomes = Vec::new();
    while let Some(o) = rx.recv().await {
        outcomes.push(o);
    }
    Ok(outcomes)
}

/// Shallow subset match: every key in `expected` must appear in `actual`
/// with an equal value. Non-object expectations fall back to equality.
pub fn response_matches(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            exp.iter().all(|(k, v)| act.get(k) == Some(v))
        }
        _ => expected == actual,
    }
}

/// Reduce a list of outcomes to counts and latency stats. An empty list
/// reports zeros across the board rather than erroring or dividing by zero.
pub fn summarize(outcomes: &[Outcome]) -> Summary {
    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.success).count();
    let mut summary = Summary {
        total,
        passed,
        failed: total - passed,
        success_rate: 0.0,
        avg_ms: 0.0,
        min_ms: 0,
        max_ms: 0,
    };
    if total == 0 {
        return summary;
    }
    summary.success_rate = passed as f64 / total as f64 * 100.0;
    let times: Vec<u64> = outcomes.iter().map(|o| o.duration_ms).collect();
    summary.avg_ms = times.iter().sum::<u64>() as f64 / times.len() as f64;
    summary.min_ms = *times.iter().min().unwrap();
    summary.max_ms = *times.iter().max().unwrap();
    summary
}

/// Render an outcome as a request-trace entry in the shape the trace miner
/// consumes, so one run's log can seed a later mining pass.
pub fn trace_entry(outcome: &Outcome) -> String {
    let mut entry = format!(
        "[{}] URL: {}\nmethod: {}\n",
        outcome.timestamp, outcome.url, outcome.method
    );
    if let Some(data) = &outcome.request_data {
        entry.push_str(&format!("body: {data}\n"));
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> TargetContext {
        TargetContext::new("localhost").with_timeout(Duration::from_secs(2))
    }

    fn case(endpoint: &str, method: &str, expected: u16) -> TestCase {
        TestCase {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            data: None,
            expected_status: expected,
            name: format!("{method} {endpoint}"),
            description: String::new(),
            negative: false,
        }
    }

    #[tokio::test]
    async fn one_success_one_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let cases = vec![case("/health", "GET", 200), case("/missing", "GET", 200)];
        let outcomes = execute(&server.uri(), cases, &ctx(), 4).await.unwrap();
        assert_eq!(outcomes.len(), 2);

        let health = outcomes.iter().find(|o| o.endpoint == "/health").unwrap();
        assert!(health.success);
        assert_eq!(health.status, Some(200));
        assert_eq!(health.response, Some(json!({"ok": true})));

        let missing = outcomes.iter().find(|o| o.endpoint == "/missing").unwrap();
        assert!(!missing.success);
        assert_eq!(missing.status, Some(404));
        assert!(missing.error.is_none());

        let summary = summarize(&outcomes);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn post_bodies_are_delivered_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/users"))
            .and(body_json(json!({"name": "x"})))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let mut c = case("/api/users", "POST", 201);
        c.data = Some(json!({"name": "x"}));
        let outcome = run_case(&client(&ctx()).unwrap(), &server.uri(), &c).await;
        assert!(outcome.success);
        assert_eq!(outcome.status, Some(201));
    }

    #[tokio::test]
    async fn transport_errors_become_failed_outcomes() {
        // Bind and drop so the port is very likely refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{addr}");
        let outcomes = execute(&base, vec![case("/x", "GET", 200)], &ctx(), 2)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].status.is_none());
        assert!(outcomes[0].error.is_some());
    }

    #[tokio::test]
    async fn long_plain_text_responses_are_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_string("z".repeat(1000)))
            .mount(&server)
            .await;

        let outcome = run_case(
            &client(&ctx()).unwrap(),
            &server.uri(),
            &case("/blob", "GET", 200),
        )
        .await;
        match outcome.response {
            Some(Value::String(s)) => {
                assert!(s.ends_with("..."));
                assert!(s.len() <= BODY_SNIPPET_MAX + 3);
            }
            other => panic!("expected truncated string, got {other:?}"),
        }
    }

    /// A raw stub that counts concurrent connections; each request holds its
    /// connection open for a while so overlap is observable.
    async fn counting_stub(in_flight: Arc<AtomicUsize>, max_seen: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let in_flight = in_flight.clone();
                let max_seen = max_seen.clone();
                tokio::spawn(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);

                    let mut buf = vec![0u8; 4096];
                    let mut seen = Vec::new();
                    while let Ok(n) = stream.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                        seen.extend_from_slice(&buf[..n]);
                        if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    // Decrement before replying; the counter must never overshoot.
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                        )
                        .await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let base = counting_stub(in_flight.clone(), max_seen.clone()).await;

        let cases: Vec<TestCase> = (0..20).map(|_| case("/work", "GET", 200)).collect();
        let outcomes = execute(&base, cases, &ctx(), 5).await.unwrap();
        assert_eq!(outcomes.len(), 20);
        assert!(outcomes.iter().all(|o| o.success));
        assert!(
            max_seen.load(Ordering::SeqCst) <= 5,
            "saw {} requests in flight",
            max_seen.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn hung_requests_time_out_into_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let ctx = TargetContext::new("localhost").with_timeout(Duration::from_millis(200));
        let outcome = run_case(
            &client(&ctx).unwrap(),
            &server.uri(),
            &case("/slow", "GET", 200),
        )
        .await;
        assert!(!outcome.success);
        assert!(outcome.status.is_none());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn empty_outcomes_summarize_to_zeros() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.avg_ms, 0.0);
        assert_eq!(summary.min_ms, 0);
        assert_eq!(summary.max_ms, 0);
    }

    #[test]
    fn subset_matching_is_shallow() {
        let expected = json!({"id": 1});
        let actual = json!({"id": 1, "name": "x"});
        assert!(response_matches(&expected, &actual));
        assert!(!response_matches(&json!({"id": 2}), &actual));
        assert!(response_matches(&json!("ok"), &json!("ok")));
    }

    #[test]
    fn outcomes_round_trip_through_serde() {
        let outcome = Outcome {
            name: "GET /x".to_string(),
            description: "d".to_string(),
            endpoint: "/x".to_string(),
            method: "GET".to_string(),
            url: "http://localhost:1/x".to_string(),
            request_data: None,
            expected_status: 200,
            status: None,
            success: false,
            negative: false,
            duration_ms: 12,
            response: None,
            error: Some("connection refused".to_string()),
            timestamp: "2024-01-05T10:00:00Z".to_string(),
        };
        let text = serde_json::to_string(&outcome).unwrap();
        let back: Outcome = serde_json::from_str(&text).unwrap();
        assert_eq!(back.error, outcome.error);
        assert_eq!(back.status, None);
        assert_eq!(back.duration_ms, 12);
    }

    #[test]
    fn trace_entries_are_minable() {
        let mut outcome = Outcome {
            name: "POST /api/orders".to_string(),
            description: String::new(),
            endpoint: "/api/orders".to_string(),
            method: "POST".to_string(),
            url: "http://localhost:8000/api/orders".to_string(),
            request_data: Some(json!({"a": 1})),
            expected_status: 201,
            status: Some(201),
            success: true,
            negative: false,
            duration_ms: 3,
            response: None,
            error: None,
            timestamp: "2024-01-05T10:00:00Z".to_string(),
        };
        let entry = trace_entry(&outcome);
        assert!(entry.contains("URL: http://localhost:8000/api/orders"));
        assert!(entry.contains("method: POST"));
        assert!(entry.contains("{\"a\":1}"));

        outcome.request_data = None;
        assert!(!trace_entry(&outcome).contains("body:"));
    }
}
