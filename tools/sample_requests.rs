//! Sample Request Generator
//!
//! Posts random client records to a running predictor and reports the
//! outcome mix and latency.
//!
//! Usage: `sample_requests [base_url] [count] [concurrency]`

use bank_deposit_predictor::types::record::{
    ClientRecord, Contact, Education, Job, Marital, Month, Outcome, YesNo,
};
use bank_deposit_predictor::types::{Label, PredictionResponse};
use futures::{stream, StreamExt};
use rand::rngs::ThreadRng;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Client record generator for smoke and load testing
struct RecordGenerator {
    rng: ThreadRng,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn pick<T: Copy>(&mut self, choices: &[T]) -> T {
        choices[self.rng.gen_range(0..choices.len())]
    }

    /// A record anywhere in the accepted input domain
    fn generate(&mut self) -> ClientRecord {
        let contacted_before = self.rng.gen_bool(0.2);
        ClientRecord {
            age: Some(self.rng.gen_range(18..=95)),
            job: Some(self.pick(Job::ALL)),
            marital: Some(self.pick(&[Marital::Married, Marital::Single, Marital::Divorced])),
            education: Some(self.pick(Education::ALL)),
            credit_default: Some(if self.rng.gen_bool(0.02) { YesNo::Yes } else { YesNo::No }),
            balance: Some(self.rng.gen_range(-2_000.0..50_000.0_f64).round()),
            housing: Some(self.pick(&[YesNo::Yes, YesNo::No])),
            loan: Some(if self.rng.gen_bool(0.15) { YesNo::Yes } else { YesNo::No }),
            contact: Some(self.pick(Contact::ALL)),
            day: Some(self.rng.gen_range(1..=31)),
            month: Some(self.pick(Month::ALL)),
            duration: Some(self.rng.gen_range(5..=1500)),
            campaign: Some(self.rng.gen_range(1..=10)),
            pdays: Some(if contacted_before { self.rng.gen_range(1..=400) } else { -1 }),
            previous: Some(if contacted_before { self.rng.gen_range(1..=5) } else { 0 }),
            poutcome: Some(if contacted_before {
                self.pick(&[Outcome::Success, Outcome::Failure, Outcome::Other])
            } else {
                Outcome::Unknown
            }),
        }
    }
}

#[derive(Debug)]
enum RequestOutcome {
    Accepted,
    Declined,
    Rejected,
}

async fn send(
    client: &reqwest::Client,
    url: &str,
    record: ClientRecord,
) -> anyhow::Result<(RequestOutcome, Duration)> {
    let start = Instant::now();
    let response = client.post(url).json(&record).send().await?;
    let elapsed = start.elapsed();

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Request rejected");
        return Ok((RequestOutcome::Rejected, elapsed));
    }

    let prediction: PredictionResponse = response.json().await?;
    let outcome = match prediction.prediction {
        Label::Accept => RequestOutcome::Accepted,
        Label::Decline => RequestOutcome::Declined,
    };
    Ok((outcome, elapsed))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_requests=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let base_url = args.get(1).map(|s| s.as_str()).unwrap_or("http://127.0.0.1:8000");
    let count: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let concurrency: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(8);
    let url = format!("{}/api/predict", base_url.trim_end_matches('/'));

    info!(url = %url, count, concurrency, "Configuration loaded");

    let mut generator = RecordGenerator::new();
    let records: Vec<ClientRecord> = (0..count).map(|_| generator.generate()).collect();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let started = Instant::now();
    let results: Vec<_> = stream::iter(records)
        .map(|record| {
            let client = &client;
            let url = url.as_str();
            async move { send(client, url, record).await }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    let wall_time = started.elapsed();

    let (mut accepted, mut declined, mut rejected, mut errors) = (0u64, 0u64, 0u64, 0u64);
    let mut latencies = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok((outcome, latency)) => {
                latencies.push(latency.as_micros() as u64);
                match outcome {
                    RequestOutcome::Accepted => accepted += 1,
                    RequestOutcome::Declined => declined += 1,
                    RequestOutcome::Rejected => rejected += 1,
                }
            }
            Err(e) => {
                errors += 1;
                warn!(error = %e, "Request failed");
            }
        }
    }

    latencies.sort_unstable();
    let p50 = latencies.get(latencies.len() / 2).copied().unwrap_or(0);
    let p99 = latencies
        .get((latencies.len() as f64 * 0.99) as usize)
        .or_else(|| latencies.last())
        .copied()
        .unwrap_or(0);

    info!(
        accepted,
        declined,
        rejected,
        errors,
        p50_us = p50,
        p99_us = p99,
        throughput = format!("{:.1} req/s", count as f64 / wall_time.as_secs_f64().max(1e-9)),
        "Completed {} requests in {:.2?}",
        count,
        wall_time
    );

    Ok(())
}
