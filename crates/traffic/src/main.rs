mod control;

use anyhow::{Context, Result};
use clap::Parser;
use rollout_core::{
    evaluator_from_config, ApiCounters, Config, DualPathResponder, HttpSender, KeyGenerator,
    LocalSender, MockSender, RawResponse, RequestSender, Route, StatsSummary, ThreadRandom,
    TracingEventSink, TrafficGenerator,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::control::Command;

#[derive(Parser, Debug)]
#[command(name = "traffic")]
#[command(about = "Rollout demo traffic generator - sends keyed requests and counts old/new hits and errors")]
struct Args {
    /// Optional configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server base URL
    #[arg(long)]
    target: Option<String>,

    /// Endpoint shape: root (GET /<key>) or echo (GET /echo/<key>)
    #[arg(long)]
    route: Option<String>,

    /// Delay between requests in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Run headless for this long, then stop and print the summary
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Print counters every N milliseconds
    #[arg(long)]
    print_every_ms: Option<u64>,

    /// Submission mode: http, mock (canned OLD replies), or local (responder in-process)
    #[arg(long, default_value = "http")]
    mode: String,

    /// Deterministic seed for request keys
    #[arg(long)]
    seed: Option<u64>,

    /// Write the final counters to this JSON file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Skip the /-/healthy check before starting
    #[arg(long)]
    skip_health: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrafficResult {
    timestamp: String,
    sender: String,
    target: String,
    counters: ApiCounters,
    stats: StatsSummary,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Create sender based on mode
    let sender = build_sender(&args.mode, &config)?;

    info!(
        "Using sender: {} (target {}, every {}ms)",
        sender.name(),
        config.traffic.target_url,
        config.traffic.interval_ms
    );

    // Check responder health before sending traffic
    if sender.name() == "http" && !args.skip_health {
        check_health(&config.traffic.target_url).await;
    }

    // Run traffic until the deadline or until the user quits
    let generator = TrafficGenerator::new(
        sender.clone(),
        Duration::from_millis(config.traffic.interval_ms),
        KeyGenerator::new(config.traffic.seed),
    );

    match args.duration_ms {
        Some(duration_ms) => {
            run_headless(&generator, duration_ms, config.traffic.print_every_ms).await
        }
        None => run_interactive(&generator, config.traffic.print_every_ms).await?,
    }
    generator.stop();

    let result = TrafficResult {
        timestamp: chrono::Utc::now().to_rfc3339(),
        sender: sender.name().to_string(),
        target: config.traffic.target_url.clone(),
        counters: generator.snapshot(),
        stats: generator.stats(),
    };

    // Write results to file
    if let Some(out) = &args.out {
        write_result(out, &result)?;
        info!("Results written to {:?}", out);
    }
    print_summary(&result);

    Ok(())
}

fn build_sender(mode: &str, config: &Config) -> Result<Arc<dyn RequestSender>> {
    let sender: Arc<dyn RequestSender> = match mode {
        "http" => Arc::new(
            HttpSender::new(
                &config.traffic.target_url,
                config.traffic.route,
                config.traffic.timeout_ms,
            )
            .context("Failed to create HTTP sender")?,
        ),
        // 5ms simulated latency, every reply served by the old path
        "mock" => {
            Arc::new(MockSender::new(RawResponse::new(200, r#"{"msg":"OLD"}"#)).with_delay(5))
        }
        "local" => {
            let flags = evaluator_from_config(&config.flags)
                .context("Failed to create flag evaluator")?;
            Arc::new(LocalSender::new(DualPathResponder::new(
                config.responder.clone(),
                Arc::from(flags),
                Arc::new(TracingEventSink),
                Arc::new(ThreadRandom),
            )))
        }
        _ => anyhow::bail!("Invalid mode: {}, must be 'http', 'mock' or 'local'", mode),
    };
    Ok(sender)
}

fn write_result(path: &Path, result: &TrafficResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create results directory {:?}", parent))?;
    }
    let result_json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, result_json)
        .with_context(|| format!("Failed to write results to {:?}", path))?;
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };

    if let Some(target) = &args.target {
        config.traffic.target_url = target.clone();
    }
    if let Some(route) = args.route.as_deref() {
        config.traffic.route = match route {
            "root" => Route::Root,
            "echo" => Route::Echo,
            other => anyhow::bail!("Invalid route: {}, must be 'root' or 'echo'", other),
        };
    }
    if let Some(interval_ms) = args.interval_ms {
        config.traffic.interval_ms = interval_ms;
    }
    if let Some(print_every_ms) = args.print_every_ms {
        config.traffic.print_every_ms = print_every_ms;
    }
    if args.seed.is_some() {
        config.traffic.seed = args.seed;
    }
    if config.traffic.interval_ms == 0 {
        anyhow::bail!("interval_ms must be greater than zero");
    }

    Ok(config)
}

fn health_url(target: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(target).with_context(|| format!("Invalid target URL: {target}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Target URL cannot be a base: {target}"))?
        .pop_if_empty()
        .push("-")
        .push("healthy");
    Ok(url)
}

async fn check_health(target: &str) {
    let url = match health_url(target) {
        Ok(url) => url,
        Err(e) => {
            warn!("Skipping health check: {}", e);
            return;
        }
    };
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("Could not build health check client: {}", e);
            return;
        }
    };

    let start = Instant::now();
    match client.get(url.clone()).send().await {
        Ok(r) if r.status().is_success() => {
            info!(
                "GET {} -> {} ({}ms)",
                url,
                r.status().as_u16(),
                start.elapsed().as_millis()
            );
        }
        Ok(r) => warn!("Health check returned non-200: {} {}", url, r.status().as_u16()),
        Err(e) => warn!("Health check failed: {} error={}", url, e),
    }
}

async fn run_headless(generator: &TrafficGenerator, duration_ms: u64, print_every_ms: u64) {
    generator.start();
    let deadline = tokio::time::sleep(Duration::from_millis(duration_ms));
    tokio::pin!(deadline);
    let mut progress = progress_interval(print_every_ms);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Ok(()) = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = progress.tick() => print_progress(generator),
        }
    }
}

async fn run_interactive(generator: &TrafficGenerator, print_every_ms: u64) -> Result<()> {
    println!("Controls: [t]oggle traffic, [r]eset counters, [s]napshot, [q]uit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut progress = progress_interval(print_every_ms);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    stdin_open = false;
                    continue;
                };
                match Command::parse(&line) {
                    Some(Command::Toggle) => {
                        let running = generator.toggle();
                        println!("{}", if running { "Traffic started" } else { "Traffic stopped" });
                    }
                    Some(Command::Reset) => {
                        generator.reset();
                        println!("Counters reset");
                    }
                    Some(Command::Snapshot) => print_progress(generator),
                    Some(Command::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command: {}", line.trim()),
                }
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = progress.tick() => {
                if generator.is_running() {
                    print_progress(generator);
                }
            }
        }
    }

    Ok(())
}

fn progress_interval(print_every_ms: u64) -> tokio::time::Interval {
    let period = Duration::from_millis(print_every_ms.max(1));
    tokio::time::interval_at(tokio::time::Instant::now() + period, period)
}

fn print_progress(generator: &TrafficGenerator) {
    let counters = generator.snapshot();
    let stats = generator.stats();
    info!(
        "Progress: old_hits={} new_hits={} old_errors={} new_errors={} in_flight={} client_errors={} p50={}ms p99={}ms",
        counters.old_hits,
        counters.new_hits,
        counters.old_errors,
        counters.new_errors,
        stats.in_flight,
        stats.client_errors,
        stats.latency_p50_ms,
        stats.latency_p99_ms
    );
}

fn print_summary(result: &TrafficResult) {
    let c = &result.counters;
    println!("\n=== Traffic Summary ({}) ===", result.sender);
    println!("Target: {}", result.target);
    println!("Duration: {}ms", result.stats.duration_ms);
    println!("Sent: {}", result.stats.sent);
    println!("Old API hits: {}", c.old_hits);
    println!("New API hits: {}", c.new_hits);
    println!(
        "Old API errors: {} ({}%)",
        c.old_errors,
        c.error_percent(rollout_core::ApiPath::Old)
    );
    println!(
        "New API errors: {} ({}%)",
        c.new_errors,
        c.error_percent(rollout_core::ApiPath::New)
    );
    println!("Unclassified: {}", result.stats.unclassified);
    println!("Client errors: {}", result.stats.client_errors);
    println!("Latency p50: {}ms", result.stats.latency_p50_ms);
    println!("Latency p95: {}ms", result.stats.latency_p95_ms);
    println!("Latency p99: {}ms", result.stats.latency_p99_ms);
    println!();
}
