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

//! Fetching, expiration, hot reload and dumps of [`LruCacheComponent`].

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use recache::{
    update_fn, BackgroundUpdateMode, ConfigSource, DumpConfig, ErrorKind, LruCacheComponent, LruCacheComponentBuilder,
    LruCacheConfig, MockClock, StatisticsStorage, UpdateValueFn,
};
use serde_json::json;

fn counting_fetch(fetches: Arc<AtomicUsize>) -> UpdateValueFn<u64, String> {
    update_fn(move |key: u64| {
        let fetches = fetches.clone();
        async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            if key == 404 {
                anyhow::bail!("host not found");
            }
            Ok(format!("10.0.0.{key}"))
        }
    })
}

async fn dns(config: LruCacheConfig, fetches: Arc<AtomicUsize>) -> LruCacheComponent<u64, String> {
    LruCacheComponentBuilder::new("dns", config, counting_fetch(fetches))
        .build()
        .await
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn test_fetch_and_expire() {
    let clock = Arc::new(MockClock::new());
    let fetches = Arc::new(AtomicUsize::new(0));
    let storage = StatisticsStorage::new();
    let component = LruCacheComponentBuilder::new(
        "dns",
        LruCacheConfig::new(2, 8).with_lifetime(Duration::from_secs(1)),
        counting_fetch(fetches.clone()),
    )
    .with_clock(clock.clone())
    .with_statistics_storage(storage.clone())
    .build()
    .await
    .unwrap();

    assert_eq!(component.get(&1).await.unwrap(), "10.0.0.1");
    assert_eq!(component.get(&1).await.unwrap(), "10.0.0.1");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(2));
    assert_eq!(component.get_optional(&1), None);
    assert_eq!(component.get(&1).await.unwrap(), "10.0.0.1");
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    let err = component.get(&404).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(component.get_optional(&404), None);

    let statistics = component.statistics();
    assert!(statistics.total.hits >= 1);
    assert!(statistics.total.misses >= 2);

    let collected = storage.collect();
    let entry = &collected["cache.lru"][0];
    assert_eq!(entry["labels"]["cache_name"], "dns");
    assert_eq!(entry["value"]["current-documents-count"], 1);

    component.invalidate();
    assert_eq!(component.get_optional(&1), None);

    component.close().await;
    assert!(storage.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_config_hot_reload() {
    let source = ConfigSource::new(json!({ "lru-caches": { "dns": { "lifetime-ms": 1000 } } }));
    let component = LruCacheComponentBuilder::new(
        "dns",
        LruCacheConfig::new(2, 8).with_lifetime(Duration::from_secs(60)),
        counting_fetch(Arc::default()),
    )
    .with_config_source(source.clone())
    .build()
    .await
    .unwrap();
    assert_eq!(component.cache().max_lifetime(), Duration::from_secs(1));
    assert_eq!(component.cache().way_size(), 8);

    source.publish(json!({
        "lru-caches": { "dns": { "way-size": 4, "background-update": "enabled" } },
    }));
    assert_eq!(component.cache().way_size(), 4);
    assert_eq!(component.cache().max_lifetime(), Duration::from_secs(60));
    assert_eq!(component.cache().tuning().background_update, BackgroundUpdateMode::Enabled);

    // An invalid patch keeps the current config.
    source.publish(json!({ "lru-caches": { "dns": { "way-size": "large" } } }));
    assert_eq!(component.cache().way_size(), 4);

    source.publish(json!({ "lru-caches": {} }));
    assert_eq!(component.cache().way_size(), 8);
    assert_eq!(component.cache().tuning().background_update, BackgroundUpdateMode::Disabled);

    component.close().await;
    assert_eq!(source.subscribers(), 0);
}

#[test_log::test(tokio::test)]
async fn test_config_settings_disabled() {
    let source = ConfigSource::new(json!({ "lru-caches": { "dns": { "way-size": 1 } } }));
    let component = LruCacheComponentBuilder::new(
        "dns",
        LruCacheConfig::new(2, 8).with_config_settings(false),
        counting_fetch(Arc::default()),
    )
    .with_config_source(source.clone())
    .build()
    .await
    .unwrap();
    assert_eq!(component.cache().way_size(), 8);
    assert_eq!(source.subscribers(), 0);
    component.close().await;
}

#[test_log::test(tokio::test)]
async fn test_zero_ways() {
    let err = LruCacheComponentBuilder::new("dns", LruCacheConfig::new(0, 8), counting_fetch(Arc::default()))
        .build()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test_log::test(tokio::test)]
async fn test_dump_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = LruCacheConfig::new(2, 8).with_dump(DumpConfig::new(dir.path()).with_max_dump_age(Duration::from_secs(3600)));

    let fetches = Arc::new(AtomicUsize::new(0));
    let component = dns(config.clone(), fetches.clone()).await;
    assert!(!component.dumper().unwrap().statistics().is_loaded);
    component.get(&1).await.unwrap();
    component.put(2, "10.0.0.22".to_string());
    component.write_dump().await.unwrap();
    component.close().await;

    let restored = dns(config, fetches.clone()).await;
    assert!(restored.dumper().unwrap().statistics().is_loaded);
    assert_eq!(restored.get_optional(&1), Some("10.0.0.1".to_string()));
    assert_eq!(restored.get(&2).await.unwrap(), "10.0.0.22");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    restored.close().await;
}
