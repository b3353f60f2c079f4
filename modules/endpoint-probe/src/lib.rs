//! Live endpoint and method discovery over HTTP.
//!
//! Discovery is best-effort: a fixed list of common API paths is knocked on,
//! and only paths that show some evidence of support end up in the result.

use anyhow::Result;
use apiprobe_core::TargetContext;
use reqwest::{header, Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;

/// Paths worth trying when nothing is known about the target.
pub const COMMON_PATHS: &[&str] = &[
    "/api",
    "/api/v1",
    "/api/v2",
    "/api/users",
    "/api/auth",
    "/users",
    "/auth",
    "/products",
    "/orders",
    "/data",
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/logout",
    "/api/products",
    "/api/orders",
    "/api/categories",
];

pub fn default_paths() -> Vec<String> {
    COMMON_PATHS.iter().map(|s| s.to_string()).collect()
}

/// Probe each candidate path and report the methods it shows evidence of
/// supporting. Paths with no evidence are omitted entirely, so every entry
/// in the result carries at least one method.
pub async fn discover(
    base_url: &str,
    paths: &[String],
    ctx: &TargetContext,
    concurrency: usize,
) -> Result<BTreeMap<String, Vec<String>>> {
    let client = Client::builder()
        .timeout(ctx.timeout)
        .user_agent(ctx.user_agent.clone())
        .build()?;
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<(String, Vec<String>)>(paths.len().max(1));

    for path in paths {
        let tx = tx.clone();
        let client = client.clone();
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        let path = path.clone();
        let permit = sem.clone().acquire_owned().await.unwrap();
        tokio::spawn(async move {
            if let Some(methods) = probe_path(&client, &url).await {
                tracing::debug!("{} supports {}", path, methods.join(","));
                let _ = tx.send((path, methods)).await;
            }
            drop(permit);
        });
    }
    drop(tx);

    let mut out = BTreeMap::new();
    while let Some((path, methods)) = rx.recv().await {
        out.insert(path, methods);
    }
    Ok(out)
}

/// One path's probe ladder: OPTIONS with an Allow header settles it; else a
/// GET that is not 404 records GET, and a zero-body POST that is neither 404
/// nor 405 adds POST. A transport failure on any single request is simply no
/// evidence for that request, never fatal to the sweep.
async fn probe_path(client: &Client, url: &str) -> Option<Vec<String>> {
    if let Ok(resp) = client.request(reqwest::Method::OPTIONS, url).send().await {
        if !resp.status().is_server_error() {
            if let Some(allow) = resp
                .headers()
                .get(header::ALLOW)
                .and_then(|v| v.to_str().ok())
            {
                let methods = parse_allow(allow);
                if !methods.is_empty() {
                    return Some(methods);
                }
            }
        }
    }

    let get = client.get(url).send().await.ok()?;
    if get.status() == StatusCode::NOT_FOUND {
        return None;
    }
    let mut methods = vec!["GET".to_string()];
    if let Ok(post) = client.post(url).json(&serde_json::json!({})).send().await {
        let status = post.status();
        if status != StatusCode::NOT_FOUND && status != StatusCode::METHOD_NOT_ALLOWED {
            methods.push("POST".to_string());
        }
    }
    Some(methods)
}

/// Split an Allow header, keeping the advertised order but uppercased and
/// deduplicated.
fn parse_allow(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for tok in raw.split(',') {
        let m = tok.trim().to_ascii_uppercase();
        if !m.is_empty() && !out.contains(&m) {
            out.push(m);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> TargetContext {
        TargetContext::new("localhost").with_timeout(std::time::Duration::from_secs(2))
    }

    #[test]
    fn allow_header_parsing() {
        assert_eq!(parse_allow("GET, POST, get"), vec!["GET", "POST"]);
        assert!(parse_allow(" , ").is_empty());
    }

    #[tokio::test]
    async fn options_allow_header_settles_a_path() {
        let server = MockServer::start().await;
        Mock::given(method("OPTIONS"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(204).insert_header("Allow", "GET, POST, DELETE"))
            .mount(&server)
            .await;

        let paths = vec!["/api".to_string()];
        let found = discover(&server.uri(), &paths, &ctx(), 4).await.unwrap();
        assert_eq!(found["/api"], vec!["GET", "POST", "DELETE"]);
    }

    #[tokio::test]
    async fn get_fallback_records_get_and_post() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let paths = vec!["/users".to_string()];
        let found = discover(&server.uri(), &paths, &ctx(), 4).await.unwrap();
        assert_eq!(found["/users"], vec!["GET", "POST"]);
    }

    #[tokio::test]
    async fn post_method_not_allowed_is_not_added() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;

        let paths = vec!["/data".to_string()];
        let found = discover(&server.uri(), &paths, &ctx(), 4).await.unwrap();
        assert_eq!(found["/data"], vec!["GET"]);
    }

    #[tokio::test]
    async fn unsupported_paths_are_omitted() {
        // The mock server answers 404 for anything unmatched.
        let server = MockServer::start().await;
        let paths = vec!["/api".to_string(), "/orders".to_string()];
        let found = discover(&server.uri(), &paths, &ctx(), 4).await.unwrap();
        assert!(found.is_empty());
    }
}
