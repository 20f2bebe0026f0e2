//! Pyron CLI - talk to a running webhook endpoint and load-test it

mod load;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_API_PREFIX: &str = "/api/v1";

#[derive(Parser)]
#[command(name = "pyron-cli")]
#[command(about = "Pyron signal buffer CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server base URL
    #[arg(long, env = "PYRON_URL", default_value = DEFAULT_BASE_URL)]
    url: String,

    /// Prefix the webhook route is mounted under
    #[arg(long, env = "PYRON_API_PREFIX", default_value = DEFAULT_API_PREFIX)]
    api_prefix: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the liveness endpoint
    Health,

    /// Post one webhook
    Send {
        /// Payload as a JSON object
        #[arg(long)]
        payload: String,
    },

    /// Constant-rate load test against the webhook endpoint
    Load {
        /// Requests per second
        #[arg(long, default_value = "20")]
        rate: u32,

        /// Test duration in seconds
        #[arg(long, default_value = "60")]
        duration_secs: u64,

        #[arg(long, default_value = "BTCUSDT")]
        ticker: String,

        #[arg(long, default_value = "95000.5")]
        price: f64,
    },
}

#[derive(Deserialize, Tabled)]
struct WebhookAnswer {
    status: String,
    message: String,
}

#[derive(Tabled)]
struct LoadSummary {
    #[tabled(rename = "Requests")]
    requests: usize,
    #[tabled(rename = "202 ratio")]
    accepted: String,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Dropped")]
    dropped: usize,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "p95")]
    p95: String,
    #[tabled(rename = "Max")]
    max: String,
}

fn webhook_url(base: &str, prefix: &str) -> String {
    let base = base.trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/webhook", base)
    } else {
        format!("{}/{}/webhook", base, prefix)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    match cli.command {
        Commands::Health => {
            let url = format!("{}/health", cli.url.trim_end_matches('/'));
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let body: serde_json::Value =
                        response.json().await.context("Failed to parse response")?;
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Reply:".bold(), body["status"]);
                }
                Ok(response) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    anyhow::bail!("health check returned {}", response.status());
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "OFFLINE".red());
                    return Err(e).context("Failed to connect to server");
                }
            }
        }

        Commands::Send { payload } => {
            let payload_json: serde_json::Value =
                serde_json::from_str(&payload).context("Invalid JSON payload")?;
            anyhow::ensure!(payload_json.is_object(), "payload must be a JSON object");

            let response = client
                .post(webhook_url(&cli.url, &cli.api_prefix))
                .json(&serde_json::json!({ "payload": payload_json }))
                .send()
                .await
                .context("Failed to connect to server")?;

            let status = response.status();
            if status.as_u16() != 202 {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("webhook rejected ({}): {}", status, body);
            }

            let queued = response
                .headers()
                .get("x-pyron-queued")
                .and_then(|v| v.to_str().ok())
                .map_or(true, |v| v == "true");
            let answer: WebhookAnswer = response.json().await.context("Failed to parse response")?;

            if queued {
                println!("{}", "✓ Payload buffered".green().bold());
            } else {
                println!("{}", "! Payload acknowledged but NOT queued (degraded)".yellow().bold());
            }
            println!();
            println!("{}", Table::new(vec![answer]));
        }

        Commands::Load {
            rate,
            duration_secs,
            ticker,
            price,
        } => {
            let config = load::LoadConfig {
                url: webhook_url(&cli.url, &cli.api_prefix),
                rate,
                duration: Duration::from_secs(duration_secs),
                ticker,
                price,
            };

            println!(
                "{}",
                format!(
                    "Load test: {} req/s for {}s against {}",
                    rate, duration_secs, config.url
                )
                .cyan()
                .bold()
            );

            let report = load::run(&client, &config).await?;
            let summary = LoadSummary {
                requests: report.requests,
                accepted: format!("{:.2}%", report.accepted_ratio() * 100.0),
                failed: report.failed,
                dropped: report.dropped,
                avg: format!("{:.1} ms", report.avg_ms),
                p95: format!("{:.1} ms", report.p95_ms),
                max: format!("{:.1} ms", report.max_ms),
            };

            println!();
            println!("{}", Table::new(vec![summary]));
            println!("{}", Table::new(report.thresholds()));
            println!();

            if report.passed() {
                println!("{}", "✓ All thresholds passed".green().bold());
            } else {
                println!("{}", "✗ Thresholds failed".red().bold());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
