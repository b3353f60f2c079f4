//! HTML and JSON rendering of run results.
//!
//! Pure formatting over the executor's outcome records; nothing here talks to
//! the network or mutates state.

use anyhow::Result;
use executor::{Outcome, Summary};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identity block stamped on every rendered report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub run_id: Uuid,
    pub target: String,
    pub generated_at: String,
}

impl ReportMeta {
    pub fn new(target: impl Into<String>) -> Self {
        ReportMeta {
            run_id: Uuid::now_v7(),
            target: target.into(),
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| String::new()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportDoc {
    pub meta: ReportMeta,
    pub summary: Summary,
    pub results: Vec<Outcome>,
}

/// Full machine-readable report; round-trips every outcome field.
pub fn json_report(meta: &ReportMeta, summary: &Summary, outcomes: &[Outcome]) -> Result<String> {
    #[derive(Serialize)]
    struct Doc<'a> {
        meta: &'a ReportMeta,
        summary: &'a Summary,
        results: &'a [Outcome],
    }
    Ok(serde_json::to_string_pretty(&Doc {
        meta,
        summary,
        results: outcomes,
    })?)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn pretty(v: &serde_json::Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}

/// Static single-file HTML report: a summary card followed by one block per
/// executed case.
pub fn html_report(meta: &ReportMeta, summary: &Summary, outcomes: &[Outcome]) -> String {
    let rate_class = if summary.failed == 0 { "good" } else { "bad" };
    let mut html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>apiprobe report</title>
<style>
body {{ font-family: Arial, sans-serif; margin: 20px; }}
.header {{ background-color: #f5f5f5; padding: 20px; border-radius: 5px; }}
.summary {{ margin: 20px 0; }}
.test-case {{ margin-bottom: 20px; padding: 15px; border: 1px solid #ddd; border-radius: 5px; }}
.test-case.success {{ border-left: 5px solid green; }}
.test-case.failure {{ border-left: 5px solid red; }}
.details {{ margin-top: 10px; font-family: monospace; white-space: pre-wrap; }}
.success-rate {{ font-size: 24px; font-weight: bold; }}
.success-rate.good {{ color: green; }}
.success-rate.bad {{ color: red; }}
table {{ width: 100%; border-collapse: collapse; }}
th, td {{ text-align: left; padding: 8px; border-bottom: 1px solid #ddd; }}
th {{ background-color: #f2f2f2; }}
</style>
</head>
<body>
<div class="header">
<h1>apiprobe report</h1>
<p>target: {target}</p>
<p>run: {run_id}</p>
<p>generated: {generated}</p>
</div>
<div class="summary">
<h2>Summary</h2>
<p>total: {total}</p>
<p>passed: {passed}</p>
<p>failed: {failed}</p>
<p class="success-rate {rate_class}">success rate: {rate:.2}%</p>
<p>latency: avg {avg:.1} ms, min {min} ms, max {max} ms</p>
</div>
<h2>Results</h2>
"#,
        target = escape(&meta.target),
        run_id = meta.run_id,
        generated = escape(&meta.generated_at),
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        rate = summary.success_rate,
        avg = summary.avg_ms,
        min = summary.min_ms,
        max = summary.max_ms,
    );

    for (i, outcome) in outcomes.iter().enumerate() {
        let class = if outcome.success { "success" } else { "failure" };
        let verdict = if outcome.success { "passed" } else { "failed" };
        let status = outcome
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        html.push_str(&format!(
            r#"<div class="test-case {class}">
<h3>{n}. {name} - {verdict}</h3>
<p>{description}</p>
<table>
<tr><th>URL</th><td>{url}</td></tr>
<tr><th>method</th><td>{method}</td></tr>
<tr><th>status</th><td>{status} (expected {expected})</td></tr>
<tr><th>duration</th><td>{duration} ms</td></tr>
</table>
<div class="details">
"#,
            n = i + 1,
            name = escape(&outcome.name),
            description = escape(&outcome.description),
            url = escape(&outcome.url),
            method = escape(&outcome.method),
            expected = outcome.expected_status,
            duration = outcome.duration_ms,
        ));
        if let Some(data) = &outcome.request_data {
            html.push_str(&format!(
                "<h4>request</h4><pre>{}</pre>\n",
                escape(&pretty(data))
            ));
        }
        if let Some(response) = &outcome.response {
            html.push_str(&format!(
                "<h4>response</h4><pre>{}</pre>\n",
                escape(&pretty(response))
            ));
        }
        if let Some(error) = &outcome.error {
            html.push_str(&format!("<h4>error</h4><pre>{}</pre>\n", escape(error)));
        }
        html.push_str("</div>\n</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(success: bool) -> Outcome {
        Outcome {
            name: "GET /health".to_string(),
            description: "exercise GET /health".to_string(),
            endpoint: "/health".to_string(),
            method: "GET".to_string(),
            url: "http://localhost:8000/health".to_string(),
            request_data: None,
            expected_status: 200,
            status: Some(if success { 200 } else { 500 }),
            success,
            negative: false,
            duration_ms: 7,
            response: Some(json!({"ok": success})),
            error: None,
            timestamp: "2024-01-05T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn json_report_round_trips() {
        let meta = ReportMeta::new("localhost:8000");
        let outcomes = vec![outcome(true), outcome(false)];
        let summary = executor::summarize(&outcomes);
        let text = json_report(&meta, &summary, &outcomes).unwrap();
        let doc: ReportDoc = serde_json::from_str(&text).unwrap();
        assert_eq!(doc.results.len(), 2);
        assert_eq!(doc.summary.total, 2);
        assert_eq!(doc.summary.passed, 1);
        assert_eq!(doc.meta.run_id, meta.run_id);
        assert_eq!(doc.results[0].status, Some(200));
    }

    #[test]
    fn html_report_marks_successes_and_failures() {
        let meta = ReportMeta::new("localhost:8000");
        let outcomes = vec![outcome(true), outcome(false)];
        let summary = executor::summarize(&outcomes);
        let html = html_report(&meta, &summary, &outcomes);
        assert!(html.contains("test-case success"));
        assert!(html.contains("test-case failure"));
        assert!(html.contains("GET /health"));
        assert!(html.contains("success rate: 50.00%"));
    }

    #[test]
    fn html_escapes_markup_in_outcome_fields() {
        let meta = ReportMeta::new("localhost");
        let mut bad = outcome(false);
        bad.error = Some("<script>alert(1)</script>".to_string());
        bad.response = None;
        let summary = executor::summarize(std::slice::from_ref(&bad));
        let html = html_report(&meta, &summary, &[bad]);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
