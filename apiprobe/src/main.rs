use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[cfg(any(
    feature = "scan",
    feature = "probe",
    feature = "mine",
    feature = "run",
    feature = "single"
))]
use std::fs::OpenOptions;
#[cfg(any(
    feature = "scan",
    feature = "probe",
    feature = "mine",
    feature = "run",
    feature = "single"
))]
use std::io::{BufWriter, Write};
#[cfg(any(feature = "probe", feature = "run"))]
use std::io::{BufRead, BufReader};
#[cfg(any(feature = "probe", feature = "run", feature = "single", feature = "stress"))]
use apiprobe_core::TargetContext;
#[cfg(any(feature = "mine", feature = "run"))]
use apiprobe_core::error::SetupError;
#[cfg(any(
    feature = "scan",
    feature = "probe",
    feature = "run",
    feature = "single",
    feature = "stress"
))]
use std::time::Duration;
#[cfg(feature = "scan")]
use time::format_description::well_known::Rfc3339;
#[cfg(feature = "scan")]
use time::OffsetDateTime;

mod config;

#[cfg(feature = "scan")]
fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Jsonl,
}

#[derive(Debug, Parser)]
#[command(
    name = "apiprobe",
    version,
    about = "API surface discovery and adaptive test corpus engine"
)]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./apiprobe.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Diagnostic verbosity (-v info, -vv debug); RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Scan a port range for TCP listeners
    #[cfg(feature = "scan")]
    Scan {
        /// Target host or IP
        host: String,
        /// Ports: comma/range list (e.g., 80,443 or 8000-8100). Overrides min/max.
        #[arg(long)]
        ports: Option<String>,
        #[arg(long, default_value_t = 8000)]
        port_min: u16,
        #[arg(long, default_value_t = 9000)]
        port_max: u16,
        /// Timeout per port in milliseconds
        #[arg(long, default_value_t = 500)]
        timeout_ms: u64,
        /// Max concurrent connection attempts
        #[arg(long, default_value_t = 256)]
        concurrency: usize,
        /// QPS cap for connection attempts; 0 disables pacing
        #[arg(long, default_value_t = 0)]
        qps: u32,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Discover live endpoints and methods on one port
    #[cfg(feature = "probe")]
    Probe {
        /// Target host or IP
        host: String,
        #[arg(long)]
        port: u16,
        /// File with newline-delimited candidate paths (default: built-in list)
        #[arg(long, value_name = "FILE")]
        paths: Option<PathBuf>,
        /// Timeout per probe request in milliseconds
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
        /// Max concurrent probes
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Mine endpoints, methods and payload templates from a request log
    #[cfg(feature = "mine")]
    Mine {
        /// Historical request log
        log: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Full pipeline: scan, mine/probe, build a corpus, execute, summarize
    #[cfg(feature = "run")]
    Run {
        /// Target host or IP
        #[arg(default_value = "localhost")]
        host: String,
        /// Ports: comma/range list. Overrides min/max.
        #[arg(long)]
        ports: Option<String>,
        #[arg(long, default_value_t = 8000)]
        port_min: u16,
        #[arg(long, default_value_t = 9000)]
        port_max: u16,
        /// Historical request log to mine before probing
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
        /// File with newline-delimited candidate paths (default: built-in list)
        #[arg(long, value_name = "FILE")]
        paths: Option<PathBuf>,
        #[arg(long, default_value_t = 500)]
        scan_timeout_ms: u64,
        #[arg(long, default_value_t = 256)]
        scan_concurrency: usize,
        /// QPS cap for the port sweep; 0 disables pacing
        #[arg(long, default_value_t = 0)]
        qps: u32,
        #[arg(long, default_value_t = 2000)]
        probe_timeout_ms: u64,
        #[arg(long, default_value_t = 8)]
        probe_concurrency: usize,
        /// Max test cases in flight
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
        /// Timeout per executed test case in milliseconds
        #[arg(long, default_value_t = 10000)]
        request_timeout_ms: u64,
        /// Expected status for truncated-body negative cases
        #[arg(long, default_value_t = 400)]
        invalid_status: u16,
        /// Bearer token attached to every request
        #[arg(long)]
        token: Option<String>,
        /// Directory for per-port HTML/JSON reports
        #[arg(long, value_name = "DIR")]
        report_dir: Option<PathBuf>,
        /// Append executed requests to this minable trace log
        #[arg(long, value_name = "FILE")]
        trace_out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/json when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Execute a single ad-hoc test case
    #[cfg(feature = "single")]
    Test {
        /// Target host or IP
        host: String,
        #[arg(long)]
        port: u16,
        /// Endpoint path, e.g. /api/users
        endpoint: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(long)]
        data: Option<String>,
        /// Expected status (default: per-method heuristic)
        #[arg(long)]
        expected_status: Option<u16>,
        /// Shallow JSON subset the response must contain
        #[arg(long)]
        expect_body: Option<String>,
        #[arg(long, default_value_t = 10000)]
        timeout_ms: u64,
        /// Bearer token attached to the request
        #[arg(long)]
        token: Option<String>,
        /// Append the executed request to this minable trace log
        #[arg(long, value_name = "FILE")]
        trace_out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Hammer one endpoint with N identical requests
    #[cfg(feature = "stress")]
    Stress {
        /// Target host or IP
        host: String,
        #[arg(long)]
        port: u16,
        /// Endpoint path, e.g. /api/users
        endpoint: String,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long, default_value_t = 100)]
        requests: usize,
        #[arg(long, default_value_t = 10)]
        concurrency: usize,
        /// JSON request body
        #[arg(long)]
        data: Option<String>,
        #[arg(long, default_value_t = 10000)]
        timeout_ms: u64,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "apiprobe={level},port_scan={level},endpoint_probe={level},trace_mine={level},payload_synth={level},corpus={level},executor={level},reqwest=warn,hyper=warn"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Write `content` to `--out` (overwriting) or stdout.
#[cfg(any(feature = "scan", feature = "probe", feature = "mine", feature = "run"))]
fn emit(out: Option<&PathBuf>, content: &str) -> Result<()> {
    match out {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(path)?;
            let mut w = BufWriter::new(file);
            writeln!(w, "{}", content)?;
            Ok(())
        }
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

/// Read a newline-delimited list, skipping blanks and # comments.
#[cfg(any(feature = "probe", feature = "run"))]
fn read_list(path: &PathBuf) -> Result<Vec<String>> {
    let fh = std::fs::File::open(path)?;
    let br = BufReader::new(fh);
    Ok(br
        .lines()
        .map_while(|l| l.ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .collect())
}

#[cfg(any(feature = "probe", feature = "run"))]
fn candidate_paths(file: Option<&PathBuf>) -> Result<Vec<String>> {
    let paths = match file {
        Some(p) => read_list(p)?,
        None => endpoint_probe::default_paths(),
    };
    if paths.is_empty() {
        return Err(apiprobe_core::error::SetupError::NoCandidatePaths.into());
    }
    Ok(paths)
}

#[cfg(any(feature = "run", feature = "single"))]
fn append_trace(path: &PathBuf, outcomes: &[executor::Outcome]) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut w = BufWriter::new(file);
    for o in outcomes {
        write!(w, "{}", executor::trace_entry(o))?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(any(feature = "single", feature = "stress"))]
fn parse_body(data: Option<&String>) -> Result<Option<serde_json::Value>> {
    match data {
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        None => Ok(None),
    }
}

#[cfg(feature = "run")]
struct PortRun {
    port: u16,
    summary: executor::Summary,
    outcomes: Vec<executor::Outcome>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    #[cfg(any(feature = "scan", feature = "run"))]
    let loaded_cfg = config::load_config(cli.config.as_deref());
    #[cfg(not(any(feature = "scan", feature = "run")))]
    let _loaded_cfg: Option<config::Config> = None;

    match cli.command {
        Commands::Version => {
            println!(
                "apiprobe {} (core {})",
                env!("CARGO_PKG_VERSION"),
                apiprobe_core::version()
            );
        }
        #[cfg(feature = "scan")]
        Commands::Scan {
            host,
            mut ports,
            mut port_min,
            mut port_max,
            mut timeout_ms,
            mut concurrency,
            mut qps,
            mut format,
            out,
        } => {
            if let Some(cfg) = &loaded_cfg {
                if let Some(s) = &cfg.scan {
                    if ports.is_none() {
                        ports = s.ports.clone();
                    }
                    if s.port_min.is_some() {
                        port_min = s.port_min.unwrap();
                    }
                    if s.port_max.is_some() {
                        port_max = s.port_max.unwrap();
                    }
                    if s.timeout_ms.is_some() {
                        timeout_ms = s.timeout_ms.unwrap();
                    }
                    if s.concurrency.is_some() {
                        concurrency = s.concurrency.unwrap();
                    }
                    if s.qps.is_some() {
                        qps = s.qps.unwrap();
                    }
                    if let Some(f) = &s.format {
                        format = match f.as_str() {
                            "json" => OutputFormat::Json,
                            "jsonl" => OutputFormat::Jsonl,
                            _ => OutputFormat::Text,
                        };
                    }
                }
            }
            let ports_vec = match ports {
                Some(spec) => port_scan::parse_ports(&spec)?,
                None => port_scan::parse_range(port_min, port_max)?,
            };
            let rt = tokio::runtime::Runtime::new()?;
            let started_at = now_rfc3339();
            let started = std::time::Instant::now();
            let host_for_scan = host.clone();
            let ports_for_scan = ports_vec.clone();
            let open = rt.block_on(async move {
                port_scan::scan(
                    &host_for_scan,
                    &ports_for_scan,
                    Duration::from_millis(timeout_ms),
                    concurrency,
                    if qps == 0 { None } else { Some(qps) },
                )
                .await
            });
            let duration_ms = started.elapsed().as_millis();
            let ended_at = now_rfc3339();
            let content = match format {
                OutputFormat::Text => {
                    if open.is_empty() {
                        format!("{}: no open ports found ({} scanned)", host, ports_vec.len())
                    } else {
                        let list = open
                            .iter()
                            .map(|p| p.to_string())
                            .collect::<Vec<_>>()
                            .join(",");
                        format!(
                            "{}: open ports [{}] ({} scanned, {} ms)",
                            host,
                            list,
                            ports_vec.len(),
                            duration_ms
                        )
                    }
                }
                OutputFormat::Json => serde_json::to_string(&serde_json::json!({
                    "host": host,
                    "scanned": ports_vec.len(),
                    "open": open,
                    "timeout_ms": timeout_ms,
                    "concurrency": concurrency,
                    "duration_ms": duration_ms,
                    "started_at": started_at,
                    "ended_at": ended_at,
                }))?,
                OutputFormat::Jsonl => open
                    .iter()
                    .map(|p| serde_json::json!({"host": host, "port": p}).to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            emit(out.as_ref(), &content)?;
        }
        #[cfg(feature = "probe")]
        Commands::Probe {
            host,
            port,
            paths,
            timeout_ms,
            concurrency,
            format,
            out,
        } => {
            let paths_list = candidate_paths(paths.as_ref())?;
            let ctx =
                TargetContext::new(&host).with_timeout(Duration::from_millis(timeout_ms));
            let base = ctx.base_url(port);
            let rt = tokio::runtime::Runtime::new()?;
            let found = rt.block_on(async {
                endpoint_probe::discover(&base, &paths_list, &ctx, concurrency).await
            })?;
            let content = match format {
                OutputFormat::Text => {
                    if found.is_empty() {
                        format!("{}: no endpoints detected", base)
                    } else {
                        found
                            .iter()
                            .map(|(p, m)| format!("{}: {}", p, m.join(",")))
                            .collect::<Vec<_>>()
                            .join("\n")
                    }
                }
                OutputFormat::Json => serde_json::to_string(&serde_json::json!({
                    "base_url": base,
                    "endpoints": found,
                }))?,
                OutputFormat::Jsonl => found
                    .iter()
                    .map(|(p, m)| {
                        serde_json::json!({"path": p, "methods": m}).to_string()
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            emit(out.as_ref(), &content)?;
        }
        #[cfg(feature = "mine")]
        Commands::Mine { log, format, out } => {
            let text = std::fs::read_to_string(&log)
                .map_err(|_| SetupError::LogNotFound(log.display().to_string()))?;
            let mined = trace_mine::mine(&text);
            let content = match format {
                OutputFormat::Text => {
                    let mut lines = Vec::new();
                    for (port, endpoints) in &mined {
                        for (path, ep) in endpoints {
                            let mut line =
                                format!("{} {}: {}", port, path, ep.methods.join(","));
                            if !ep.templates.is_empty() {
                                let with: Vec<&str> =
                                    ep.templates.keys().map(|s| s.as_str()).collect();
                                line.push_str(&format!(" (templates: {})", with.join(",")));
                            }
                            lines.push(line);
                        }
                    }
                    if lines.is_empty() {
                        "no endpoints recovered".to_string()
                    } else {
                        lines.join("\n")
                    }
                }
                OutputFormat::Json => serde_json::to_string(&mined)?,
                OutputFormat::Jsonl => {
                    let mut lines = Vec::new();
                    for (port, endpoints) in &mined {
                        for (path, ep) in endpoints {
                            lines.push(
                                serde_json::json!({
                                    "port": port,
                                    "path": path,
                                    "methods": ep.methods,
                                    "templates": ep.templates,
                                })
                                .to_string(),
                            );
                        }
                    }
                    lines.join("\n")
                }
            };
            emit(out.as_ref(), &content)?;
        }
        #[cfg(feature = "run")]
        Commands::Run {
            mut host,
            mut ports,
            mut port_min,
            mut port_max,
            mut log,
            paths,
            scan_timeout_ms,
            scan_concurrency,
            qps,
            probe_timeout_ms,
            probe_concurrency,
            mut concurrency,
            mut request_timeout_ms,
            mut invalid_status,
            token,
            report_dir,
            trace_out,
            mut format,
            out,
            csv,
        } => {
            if let Some(cfg) = &loaded_cfg {
                if let Some(r) = &cfg.run {
                    if let Some(h) = &r.host {
                        host = h.clone();
                    }
                    if ports.is_none() {
                        ports = r.ports.clone();
                    }
                    if r.port_min.is_some() {
                        port_min = r.port_min.unwrap();
                    }
                    if r.port_max.is_some() {
                        port_max = r.port_max.unwrap();
                    }
                    if log.is_none() {
                        log = r.log.as_ref().map(PathBuf::from);
                    }
                    if r.concurrency.is_some() {
                        concurrency = r.concurrency.unwrap();
                    }
                    if r.request_timeout_ms.is_some() {
                        request_timeout_ms = r.request_timeout_ms.unwrap();
                    }
                    if r.invalid_status.is_some() {
                        invalid_status = r.invalid_status.unwrap();
                    }
                    if let Some(f) = &r.format {
                        format = match f.as_str() {
                            "json" => OutputFormat::Json,
                            "jsonl" => OutputFormat::Jsonl,
                            _ => OutputFormat::Text,
                        };
                    }
                }
            }
            let ports_vec = match ports {
                Some(spec) => port_scan::parse_ports(&spec)?,
                None => port_scan::parse_range(port_min, port_max)?,
            };
            // Setup mistakes (missing log, empty path list) fail before any
            // network traffic.
            let log_text = match &log {
                Some(p) => Some(
                    std::fs::read_to_string(p)
                        .map_err(|_| SetupError::LogNotFound(p.display().to_string()))?,
                ),
                None => None,
            };
            let paths_list = candidate_paths(paths.as_ref())?;

            let mut ctx = TargetContext::new(&host)
                .with_timeout(Duration::from_millis(request_timeout_ms));
            if let Some(tok) = &token {
                ctx = ctx.with_bearer(tok);
            }
            let probe_ctx = ctx
                .clone()
                .with_timeout(Duration::from_millis(probe_timeout_ms));
            let build_opts = corpus::BuildOptions { invalid_status };

            let rt = tokio::runtime::Runtime::new()?;
            let runs: Vec<PortRun> = rt.block_on(async {
                let open = port_scan::scan(
                    &ctx.host,
                    &ports_vec,
                    Duration::from_millis(scan_timeout_ms),
                    scan_concurrency,
                    if qps == 0 { None } else { Some(qps) },
                )
                .await;
                if open.is_empty() {
                    tracing::warn!(
                        "no open ports in {}-{}",
                        ports_vec.first().copied().unwrap_or_default(),
                        ports_vec.last().copied().unwrap_or_default()
                    );
                }
                let mined = log_text.as_deref().map(trace_mine::mine);
                let mut runs = Vec::new();
                for port in open {
                    let base = ctx.base_url(port);
                    let endpoints = match mined.as_ref().and_then(|m| m.get(&port)) {
                        // The log already tells us what lives here.
                        Some(known) => corpus::merge(&Default::default(), Some(known)),
                        None => {
                            let probed = endpoint_probe::discover(
                                &base,
                                &paths_list,
                                &probe_ctx,
                                probe_concurrency,
                            )
                            .await?;
                            corpus::merge(&probed, None)
                        }
                    };
                    if endpoints.is_empty() {
                        tracing::warn!("port {}: no endpoints detected, skipping", port);
                        continue;
                    }
                    let cases = corpus::build(&endpoints, &build_opts);
                    tracing::info!("port {}: executing {} cases", port, cases.len());
                    let outcomes = executor::execute(&base, cases, &ctx, concurrency).await?;
                    let summary = executor::summarize(&outcomes);
                    runs.push(PortRun {
                        port,
                        summary,
                        outcomes,
                    });
                }
                Ok::<_, anyhow::Error>(runs)
            })?;

            if let Some(path) = &trace_out {
                for run in &runs {
                    append_trace(path, &run.outcomes)?;
                }
            }
            if let Some(dir) = &report_dir {
                std::fs::create_dir_all(dir)?;
                for run in &runs {
                    let meta = report::ReportMeta::new(format!("{}:{}", host, run.port));
                    let html = report::html_report(&meta, &run.summary, &run.outcomes);
                    let json = report::json_report(&meta, &run.summary, &run.outcomes)?;
                    std::fs::write(
                        dir.join(format!("apiprobe_report_port_{}.html", run.port)),
                        html,
                    )?;
                    std::fs::write(
                        dir.join(format!("apiprobe_report_port_{}.json", run.port)),
                        json,
                    )?;
                }
            }

            if csv {
                if let Some(path) = &out {
                    let mut wtr = csv::Writer::from_writer(std::fs::File::create(path)?);
                    wtr.write_record([
                        "port",
                        "name",
                        "method",
                        "url",
                        "status",
                        "expected_status",
                        "success",
                        "duration_ms",
                        "error",
                        "timestamp",
                    ])?;
                    for run in &runs {
                        for o in &run.outcomes {
                            wtr.write_record([
                                run.port.to_string(),
                                o.name.clone(),
                                o.method.clone(),
                                o.url.clone(),
                                o.status.map(|s| s.to_string()).unwrap_or_default(),
                                o.expected_status.to_string(),
                                o.success.to_string(),
                                o.duration_ms.to_string(),
                                o.error.clone().unwrap_or_default(),
                                o.timestamp.clone(),
                            ])?;
                        }
                    }
                    wtr.flush()?;
                    return Ok(());
                }
                println!("--csv requires --out <file>");
            }

            let content = match format {
                OutputFormat::Text => {
                    if runs.is_empty() {
                        format!("{}: nothing to test", host)
                    } else {
                        runs.iter()
                            .map(|r| {
                                format!(
                                    "port {}: {} tests, {} passed, {} failed ({:.1}%, avg {:.1} ms)",
                                    r.port,
                                    r.summary.total,
                                    r.summary.passed,
                                    r.summary.failed,
                                    r.summary.success_rate,
                                    r.summary.avg_ms
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n")
                    }
                }
                OutputFormat::Json => {
                    let ports: Vec<serde_json::Value> = runs
                        .iter()
                        .map(|r| {
                            serde_json::json!({
                                "port": r.port,
                                "summary": r.summary,
                                "results": r.outcomes,
                            })
                        })
                        .collect();
                    serde_json::to_string(&serde_json::json!({
                        "host": host,
                        "ports": ports,
                    }))?
                }
                OutputFormat::Jsonl => {
                    let mut lines = Vec::new();
                    for r in &runs {
                        for o in &r.outcomes {
                            let mut v = serde_json::to_value(o)?;
                            v["port"] = serde_json::json!(r.port);
                            lines.push(v.to_string());
                        }
                    }
                    lines.join("\n")
                }
            };
            emit(out.as_ref(), &content)?;
        }
        #[cfg(feature = "single")]
        Commands::Test {
            host,
            port,
            endpoint,
            method,
            data,
            expected_status,
            expect_body,
            timeout_ms,
            token,
            trace_out,
            format,
        } => {
            let method = method.to_ascii_uppercase();
            let body = parse_body(data.as_ref())?;
            let expect_body: Option<serde_json::Value> = match &expect_body {
                Some(raw) => Some(serde_json::from_str(raw)?),
                None => None,
            };
            let expected = expected_status.unwrap_or_else(|| corpus::expected_status(&method));
            let case = corpus::TestCase {
                endpoint: endpoint.clone(),
                method: method.clone(),
                data: body,
                expected_status: expected,
                name: format!("{method} {endpoint}"),
                description: format!("ad-hoc {method} {endpoint}"),
                negative: false,
            };
            let mut ctx =
                TargetContext::new(&host).with_timeout(Duration::from_millis(timeout_ms));
            if let Some(tok) = &token {
                ctx = ctx.with_bearer(tok);
            }
            let base = ctx.base_url(port);
            let rt = tokio::runtime::Runtime::new()?;
            let outcome = rt.block_on(async {
                let client = executor::client(&ctx)?;
                Ok::<_, anyhow::Error>(executor::run_case(&client, &base, &case).await)
            })?;
            let body_match = match (&expect_body, &outcome.response) {
                (Some(expected), Some(actual)) => executor::response_matches(expected, actual),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if let Some(path) = &trace_out {
                append_trace(path, std::slice::from_ref(&outcome))?;
            }
            match format {
                OutputFormat::Text => {
                    let verdict = if outcome.success && body_match {
                        "PASS"
                    } else {
                        "FAIL"
                    };
                    let status = outcome
                        .status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{} {} -> {} (expected {}, {} ms)",
                        verdict, outcome.name, status, outcome.expected_status, outcome.duration_ms
                    );
                    if let Some(e) = &outcome.error {
                        println!("error: {}", e);
                    }
                    if !body_match {
                        println!("response body did not contain the expected subset");
                    }
                    if let Some(resp) = &outcome.response {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(resp)
                                .unwrap_or_else(|_| resp.to_string())
                        );
                    }
                }
                OutputFormat::Json | OutputFormat::Jsonl => {
                    let mut v = serde_json::to_value(&outcome)?;
                    v["body_match"] = serde_json::json!(body_match);
                    println!("{}", v);
                }
            }
        }
        #[cfg(feature = "stress")]
        Commands::Stress {
            host,
            port,
            endpoint,
            method,
            requests,
            concurrency,
            data,
            timeout_ms,
            format,
        } => {
            let method = method.to_ascii_uppercase();
            let body = parse_body(data.as_ref())?;
            let expected = corpus::expected_status(&method);
            let cases: Vec<corpus::TestCase> = (0..requests)
                .map(|i| corpus::TestCase {
                    endpoint: endpoint.clone(),
                    method: method.clone(),
                    data: body.clone(),
                    expected_status: expected,
                    name: format!("{method} {endpoint} #{i}"),
                    description: format!("stress {method} {endpoint}"),
                    negative: false,
                })
                .collect();
            let ctx =
                TargetContext::new(&host).with_timeout(Duration::from_millis(timeout_ms));
            let base = ctx.base_url(port);
            let rt = tokio::runtime::Runtime::new()?;
            let outcomes = rt
                .block_on(async { executor::execute(&base, cases, &ctx, concurrency).await })?;
            let summary = executor::summarize(&outcomes);
            match format {
                OutputFormat::Text => {
                    println!("URL: {}{}", base, endpoint);
                    println!("method: {}", method);
                    println!("total: {}", summary.total);
                    println!("passed: {}", summary.passed);
                    println!("success rate: {:.1}%", summary.success_rate);
                    println!(
                        "latency: avg {:.1} ms, min {} ms, max {} ms",
                        summary.avg_ms, summary.min_ms, summary.max_ms
                    );
                }
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string(&serde_json::json!({
                            "url": format!("{}{}", base, endpoint),
                            "method": method,
                            "summary": summary,
                        }))?
                    );
                }
                OutputFormat::Jsonl => {
                    for o in &outcomes {
                        println!("{}", serde_json::to_string(o)?);
                    }
                }
            }
        }
    }
    Ok(())
}
