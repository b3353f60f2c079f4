//! TCP connect scan with timeouts and bounded concurrency.

use anyhow::{anyhow, Result};
use apiprobe_core::error::SetupError;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Parse a comma-separated list of ports/ranges (e.g., "80,443", "8000-8100").
pub fn parse_ports(spec: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();
    for part in spec.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let s: u16 = start.parse()?;
            let e: u16 = end.parse()?;
            if s == 0 || e == 0 || s > e {
                return Err(anyhow!("invalid port range: {}", part));
            }
            ports.extend(s..=e);
        } else {
            let p: u16 = part.parse()?;
            if p == 0 {
                return Err(anyhow!("invalid port: {}", part));
            }
            ports.push(p);
        }
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Expand an inclusive numeric range. Zero or inverted bounds are a caller
/// mistake and fail fast rather than producing an empty sweep.
pub fn parse_range(min: u16, max: u16) -> Result<Vec<u16>, SetupError> {
    if min == 0 || min > max {
        return Err(SetupError::InvalidPortRange { min, max });
    }
    Ok((min..=max).collect())
}

/// Resolve a host once, best effort. Falls back to the literal input so the
/// connect attempts themselves report the failure.
fn resolve_best_effort(host: &str) -> String {
    if let Ok(mut it) = (host, 0u16).to_socket_addrs() {
        if let Some(sock) = it.next() {
            return sock.ip().to_string();
        }
    }
    host.to_string()
}

/// Scan the given ports with one TCP connect attempt each. A connect within
/// the timeout marks the port open; refusal or timeout marks it closed. Both
/// are expected outcomes, so the sweep itself never fails and an all-closed
/// target yields an empty list (sorted ascending otherwise).
pub async fn scan(
    host: &str,
    ports: &[u16],
    per_port_timeout: Duration,
    concurrency: usize,
    qps: Option<u32>,
) -> Vec<u16> {
    let host = resolve_best_effort(host);
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<u16>(ports.len().max(1));
    let mut ticker = qps.map(|q| {
        let mut it = interval(Duration::from_millis((1000u32 / q.max(1)) as u64));
        it.set_missed_tick_behavior(MissedTickBehavior::Delay);
        it
    });

    for &port in ports {
        if let Some(t) = ticker.as_mut() {
            t.tick().await;
        }
        let tx = tx.clone();
        let host = host.clone();
        let permit = sem.clone().acquire_owned().await.unwrap();
        tokio::spawn(async move {
            let addr = (host.as_str(), port);
            if let Ok(Ok(_stream)) = timeout(per_port_timeout, TcpStream::connect(addr)).await {
                tracing::debug!("port {} open", port);
                let _ = tx.send(port).await;
            }
            drop(permit);
        });
    }
    drop(tx);

    let mut open = Vec::new();
    while let Some(p) = rx.recv().await {
        open.push(p);
    }
    open.sort_unstable();
    open
}
