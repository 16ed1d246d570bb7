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

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use hdrhistogram::Histogram;
use parking_lot::RwLock;

/// Latencies in microseconds, up to one minute.
fn latency_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, 60_000_000, 2).unwrap()
}

#[derive(Clone)]
pub struct Metrics {
    pub get_lats: Arc<RwLock<Histogram<u64>>>,
    pub fetch_lats: Arc<RwLock<Histogram<u64>>>,
    pub gets: Arc<AtomicU64>,
    pub hits: Arc<AtomicU64>,
    pub fetches: Arc<AtomicU64>,
    pub errors: Arc<AtomicU64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            get_lats: Arc::new(RwLock::new(latency_histogram())),
            fetch_lats: Arc::new(RwLock::new(latency_histogram())),
            gets: Arc::default(),
            hits: Arc::default(),
            fetches: Arc::default(),
            errors: Arc::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsDump {
    pub gets: u64,
    pub hits: u64,
    pub fetches: u64,
    pub errors: u64,
    pub get_p50: u64,
    pub get_p99: u64,
    pub get_p999: u64,
    pub get_max: u64,
    pub fetch_p50: u64,
    pub fetch_p99: u64,
}

impl Metrics {
    pub fn dump(&self) -> MetricsDump {
        let get_lats = self.get_lats.read();
        let fetch_lats = self.fetch_lats.read();
        MetricsDump {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            get_p50: get_lats.value_at_quantile(0.5),
            get_p99: get_lats.value_at_quantile(0.99),
            get_p999: get_lats.value_at_quantile(0.999),
            get_max: get_lats.max(),
            fetch_p50: fetch_lats.value_at_quantile(0.5),
            fetch_p99: fetch_lats.value_at_quantile(0.99),
        }
    }

    pub fn record_get(&self, lat_us: u64) {
        if let Err(e) = self.get_lats.write().record(lat_us) {
            tracing::error!(%e, lat_us, "[bench]: record get latency failed");
        }
    }

    pub fn record_fetch(&self, lat_us: u64) {
        if let Err(e) = self.fetch_lats.write().record(lat_us) {
            tracing::error!(%e, lat_us, "[bench]: record fetch latency failed");
        }
    }
}

#[derive(Debug)]
pub struct Analysis {
    elapsed: Duration,
    gets: u64,
    get_iops: f64,
    hit_ratio: f64,
    fetches: u64,
    errors: u64,
    end: MetricsDump,
}

pub fn analyze(elapsed: Duration, start: &MetricsDump, end: &MetricsDump) -> Analysis {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let gets = end.gets - start.gets;
    let hits = end.hits - start.hits;
    Analysis {
        elapsed,
        gets,
        get_iops: gets as f64 / secs,
        hit_ratio: if gets == 0 { 0.0 } else { hits as f64 / gets as f64 },
        fetches: end.fetches - start.fetches,
        errors: end.errors - start.errors,
        end: *end,
    }
}

impl Display for Analysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "elapsed: {:.3?}", self.elapsed)?;
        writeln!(f, "gets: {} ({:.0} iops)", self.gets, self.get_iops)?;
        writeln!(f, "hit ratio: {:.2}%", self.hit_ratio * 100.0)?;
        writeln!(f, "fetches: {}", self.fetches)?;
        writeln!(f, "errors: {}", self.errors)?;
        writeln!(
            f,
            "get lat p50: {}us, p99: {}us, p999: {}us, max: {}us",
            self.end.get_p50, self.end.get_p99, self.end.get_p999, self.end.get_max
        )?;
        write!(
            f,
            "fetch lat p50: {}us, p99: {}us",
            self.end.fetch_p50, self.end.fetch_p99
        )
    }
}

pub async fn monitor(metrics: Metrics, interval: Duration, mut stop: tokio::sync::broadcast::Receiver<()>) {
    let mut last = metrics.dump();
    loop {
        tokio::select! {
            biased;
            _ = stop.recv() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        let now = metrics.dump();
        println!("{}\n", analyze(interval, &last, &now));
        last = now;
    }
}
