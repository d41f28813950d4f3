//! End-to-end call benchmark for hula.
//!
//! Runs concurrent clients against a live server, each issuing channel calls
//! back to back, and reports calls per second and latency percentiles.

use hula_protocol::{Encoding, Query};
use hula_transport::{ChannelClient, ClientConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SERVER_URL: &str = "ws://127.0.0.1:3000/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let encoding = match args.get(2).map(String::as_str) {
        Some("binary") => Encoding::Binary,
        _ => Encoding::Text,
    };

    println!("hula end-to-end call benchmark");
    println!("  server:   {} (start it with: cargo run --release)", SERVER_URL);
    println!("  clients:  {}", num_clients);
    println!("  encoding: {:?}", encoding);
    println!();

    let mut query = Query::new();
    query.insert("items".to_string(), json!("milk,eggs,bread,tea"));

    let latencies = Arc::new(Mutex::new(Vec::new()));
    let measuring = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut handles = Vec::new();

    for _ in 0..num_clients {
        let config = ClientConfig {
            url: SERVER_URL.to_string(),
            call_timeout: Some(Duration::from_secs(5)),
            encoding,
            ..ClientConfig::default()
        };
        let client = ChannelClient::connect(config);
        let query = query.clone();
        let latencies = Arc::clone(&latencies);
        let measuring = Arc::clone(&measuring);

        handles.push(tokio::spawn(async move {
            let mut local = Vec::new();
            loop {
                let start = Instant::now();
                match client.call("/todo/list", query.clone(), true).await {
                    Ok(_) => {
                        if measuring.load(std::sync::atomic::Ordering::Relaxed) {
                            local.push(start.elapsed());
                        }
                    }
                    Err(e) => {
                        eprintln!("call failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
                let stopped = !measuring.load(std::sync::atomic::Ordering::Relaxed);
                if local.len() >= 1024 || (stopped && !local.is_empty()) {
                    latencies.lock().await.append(&mut local);
                }
            }
        }));
    }

    println!("Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    measuring.store(true, std::sync::atomic::Ordering::Relaxed);
    let start = Instant::now();
    println!("Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;
    measuring.store(false, std::sync::atomic::Ordering::Relaxed);
    let elapsed = start.elapsed();

    // let clients flush what they measured
    tokio::time::sleep(Duration::from_millis(500)).await;
    for handle in handles {
        handle.abort();
    }

    let mut latencies = latencies.lock().await;
    latencies.sort();
    let total = latencies.len();
    if total == 0 {
        println!("No calls completed; is the server running?");
        return;
    }

    let percentile = |p: f64| latencies[((total as f64 * p) as usize).min(total - 1)];

    println!();
    println!("Results");
    println!("  calls:      {:>10}", total);
    println!("  throughput: {:>10.0} calls/s", total as f64 / elapsed.as_secs_f64());
    println!("  p50:        {:>10.2?}", percentile(0.50));
    println!("  p99:        {:>10.2?}", percentile(0.99));
    println!("  max:        {:>10.2?}", latencies[total - 1]);
}
