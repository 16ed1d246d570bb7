// Copyright 2026 recache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read-heavy load generator for an [`LruCacheComponent`] with skewed keys and a slow source.

mod analyze;

use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use analyze::{analyze, monitor, Metrics};
use bytesize::ByteSize;
use clap::Parser;
use futures_util::future::join_all;
use itertools::Itertools;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Zipf};
use recache::{update_fn, BackgroundUpdateMode, LruCacheComponent, LruCacheComponentBuilder, LruCacheConfig};
use tokio::sync::broadcast;

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Duration of the bench.
    #[arg(short, long, default_value = "60s", value_parser = humantime::parse_duration)]
    time: Duration,

    /// Interval of the progress reports.
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    report_interval: Duration,

    /// Reader count.
    #[arg(long, default_value_t = 16)]
    readers: usize,

    /// Number of distinct keys.
    #[arg(long, default_value_t = 100_000)]
    keys: u64,

    /// Zipf exponent of the key popularity.
    #[arg(long, default_value_t = 1.0)]
    zipf_s: f64,

    /// Cache ways.
    #[arg(long, default_value_t = 64)]
    ways: usize,

    /// Capacity of each way.
    #[arg(long, default_value_t = 256)]
    way_size: usize,

    /// Value lifetime, `0s` disables expiration.
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    lifetime: Duration,

    /// Refresh values older than half of their lifetime in background.
    #[arg(long, default_value_t = false)]
    background_update: bool,

    /// Latency of the simulated source.
    #[arg(long, default_value = "1ms", value_parser = humantime::parse_duration)]
    fetch_latency: Duration,

    /// Size of each value.
    #[arg(long, default_value = "1KiB")]
    value_size: ByteSize,
}

fn init_logger() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_line_number(true))
        .with(EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    #[cfg(feature = "deadlock")]
    {
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(1));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }

            println!("{} deadlocks detected", deadlocks.len());
            for (i, threads) in deadlocks.iter().enumerate() {
                println!("Deadlock #{}", i);
                for t in threads {
                    println!("Thread Id {:#?}", t.thread_id());
                    println!("{:#?}", t.backtrace());
                }
            }
            panic!()
        });
    }

    let args = Args::parse();
    println!("{:#?}", args);
    anyhow::ensure!(args.keys > 0, "\"--keys\" value must be greater than 0");

    let metrics = Metrics::default();

    let fetch = {
        let metrics = metrics.clone();
        let latency = args.fetch_latency;
        let value_size = args.value_size.as_u64() as usize;
        update_fn(move |key: u64| {
            let metrics = metrics.clone();
            async move {
                let start = Instant::now();
                tokio::time::sleep(latency).await;
                metrics.fetches.fetch_add(1, Ordering::Relaxed);
                metrics.record_fetch(start.elapsed().as_micros() as u64);
                Ok(value(key, value_size))
            }
        })
    };

    let background_update = if args.background_update {
        BackgroundUpdateMode::Enabled
    } else {
        BackgroundUpdateMode::Disabled
    };
    let config = LruCacheConfig::new(args.ways, args.way_size)
        .with_lifetime(args.lifetime)
        .with_background_update(background_update);
    let cache = Arc::new(LruCacheComponentBuilder::new("bench", config, fetch).build().await?);

    let (stop_tx, _) = broadcast::channel(16);

    let handle_monitor = tokio::spawn(monitor(metrics.clone(), args.report_interval, stop_tx.subscribe()));
    let handle_signal = tokio::spawn({
        let stop_tx = stop_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("[bench]: cancelled with CTRL-C");
                let _ = stop_tx.send(());
            }
        }
    });

    let start_dump = metrics.dump();
    let start = Instant::now();

    let zipf = Zipf::new(args.keys as f64, args.zipf_s)?;
    let handles = (0..args.readers)
        .map(|id| {
            tokio::spawn(read(
                id as u64,
                cache.clone(),
                zipf,
                args.time,
                metrics.clone(),
                stop_tx.subscribe(),
            ))
        })
        .collect_vec();
    join_all(handles).await;

    let analysis = analyze(start.elapsed(), &start_dump, &metrics.dump());
    let _ = stop_tx.send(());
    cache.close().await;
    handle_monitor.abort();
    handle_signal.abort();

    println!("\nTotal:\n{}", analysis);
    println!("cache: {:?}", cache.statistics().total);
    Ok(())
}

fn value(key: u64, size: usize) -> Vec<u8> {
    key.to_le_bytes().iter().copied().cycle().take(size).collect()
}

async fn read(
    id: u64,
    cache: Arc<LruCacheComponent<u64, Vec<u8>>>,
    zipf: Zipf<f64>,
    time: Duration,
    metrics: Metrics,
    mut stop: broadcast::Receiver<()>,
) {
    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(id);

    loop {
        match stop.try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => {}
            _ => return,
        }
        if start.elapsed() >= time {
            return;
        }

        // Scatter popular ranks over the key space so that they do not share a way.
        let rank = zipf.sample(&mut rng) as u64;
        let key = rank.wrapping_mul(0x9e37_79b9_7f4a_7c15);

        let now = Instant::now();
        let hit = cache.get_optional(&key).is_some();
        if hit {
            metrics.hits.fetch_add(1, Ordering::Relaxed);
        } else if let Err(e) = cache.get(&key).await {
            tracing::error!(key, %e, "[bench]: fetch failed");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
        metrics.record_get(now.elapsed().as_micros() as u64);
        metrics.gets.fetch_add(1, Ordering::Relaxed);

        tokio::task::consume_budget().await;
    }
}
