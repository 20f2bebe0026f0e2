//! Constant-arrival-rate load generator
//!
//! Fires `rate` webhook requests per second for `duration`, independent of
//! how fast responses come back, then summarizes latency and failures.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabled::Tabled;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Upper bound on requests in flight; arrivals beyond it are dropped
pub const MAX_IN_FLIGHT: usize = 100;

pub const MAX_FAILURE_RATE: f64 = 0.01;
pub const MAX_P95_MS: f64 = 600.0;
pub const MAX_AVG_MS: f64 = 300.0;

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub url: String,
    pub rate: u32,
    pub duration: Duration,
    pub ticker: String,
    pub price: f64,
}

/// One completed request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// `None` when the request never got a response
    pub status: Option<u16>,
    pub latency: Duration,
}

impl Sample {
    pub fn is_failure(&self) -> bool {
        !matches!(self.status, Some(code) if code < 400)
    }

    pub fn is_accepted(&self) -> bool {
        self.status == Some(202)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub requests: usize,
    pub accepted: usize,
    pub failed: usize,
    pub dropped: usize,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Tabled)]
pub struct ThresholdRow {
    #[tabled(rename = "Threshold")]
    pub name: &'static str,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Observed")]
    pub observed: String,
    #[tabled(rename = "Result")]
    pub result: &'static str,
}

impl LoadReport {
    pub fn from_samples(samples: &[Sample], dropped: usize, elapsed: Duration) -> Self {
        let mut latencies: Vec<f64> = samples
            .iter()
            .map(|s| s.latency.as_secs_f64() * 1000.0)
            .collect();
        latencies.sort_by(|a, b| a.total_cmp(b));

        let avg_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };

        Self {
            requests: samples.len(),
            accepted: samples.iter().filter(|s| s.is_accepted()).count(),
            failed: samples.iter().filter(|s| s.is_failure()).count(),
            dropped,
            avg_ms,
            p95_ms: percentile(&latencies, 95.0),
            max_ms: latencies.last().copied().unwrap_or(0.0),
            elapsed,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failed as f64 / self.requests as f64
        }
    }

    pub fn accepted_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.accepted as f64 / self.requests as f64
        }
    }

    pub fn thresholds(&self) -> Vec<ThresholdRow> {
        fn row(name: &'static str, limit: String, observed: String, passed: bool) -> ThresholdRow {
            ThresholdRow {
                name,
                limit,
                observed,
                result: if passed { "PASS" } else { "FAIL" },
            }
        }

        vec![
            row(
                "failure rate",
                format!("< {:.0}%", MAX_FAILURE_RATE * 100.0),
                format!("{:.2}%", self.failure_rate() * 100.0),
                self.failure_rate() < MAX_FAILURE_RATE,
            ),
            row(
                "p95 latency",
                format!("< {:.0} ms", MAX_P95_MS),
                format!("{:.1} ms", self.p95_ms),
                self.p95_ms < MAX_P95_MS,
            ),
            row(
                "avg latency",
                format!("< {:.0} ms", MAX_AVG_MS),
                format!("{:.1} ms", self.avg_ms),
                self.avg_ms < MAX_AVG_MS,
            ),
        ]
    }

    pub fn passed(&self) -> bool {
        self.thresholds().iter().all(|row| row.result == "PASS")
    }
}

/// Nearest-rank percentile over an ascending slice
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Signal body in the shape trading alerts arrive in
pub fn signal_body(ticker: &str, price: f64) -> serde_json::Value {
    json!({
        "payload": {
            "ticker": ticker,
            "action": "buy",
            "price": price,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    })
}

pub async fn run(client: &reqwest::Client, config: &LoadConfig) -> Result<LoadReport> {
    anyhow::ensure!(config.rate > 0, "rate must be at least 1 request per second");

    let permits = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut tasks = JoinSet::new();
    let mut dropped = 0usize;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / config.rate as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let started = Instant::now();
    while started.elapsed() < config.duration {
        ticker.tick().await;
        let Ok(permit) = permits.clone().try_acquire_owned() else {
            dropped += 1;
            continue;
        };

        let request = client
            .post(&config.url)
            .json(&signal_body(&config.ticker, config.price));
        tasks.spawn(async move {
            let sent = Instant::now();
            let status = request.send().await.ok().map(|r| r.status().as_u16());
            drop(permit);
            Sample {
                status,
                latency: sent.elapsed(),
            }
        });
    }

    let mut samples = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        samples.push(joined?);
    }

    Ok(LoadReport::from_samples(&samples, dropped, started.elapsed()))
}
