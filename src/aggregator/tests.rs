use super::pipeline::{filter, merge_pair, merge_tokens, sort_tokens};
use crate::error::Error;
use crate::models::{QueryOptions, SortKey, SortOrder, Token};
use crate::tests::common::{aggregator_with, memory_cache, token, FakeSource};
use crate::utils::{Cache, CacheStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

fn addresses(tokens: &[Token]) -> Vec<&str> {
    tokens.iter().map(|t| t.address.as_str()).collect()
}

#[test]
fn test_merge_is_idempotent() {
    let record = Token {
        market_cap: 10.0,
        transactions_24h: 4,
        price_change_7d: Some(2.0),
        protocol: "raydium".to_string(),
        last_updated: 99,
        ..token("a", 500.0, 40.0)
    };
    assert_eq!(merge_pair(&record, &record), record);
}

#[test]
fn test_merge_takes_max_and_first_identity() {
    let first = Token {
        name: String::new(),
        symbol: "BONK".to_string(),
        price: 0.00002,
        market_cap: 100.0,
        transactions_24h: 10,
        protocol: "raydium".to_string(),
        source: "dexscreener".to_string(),
        last_updated: 5,
        ..token("Bonk", 500.0, 2000.0)
    };
    let second = Token {
        name: "Bonk".to_string(),
        symbol: "bonk".to_string(),
        price: 0.00003,
        market_cap: 300.0,
        transactions_24h: 7,
        protocol: "orca".to_string(),
        source: "geckoterminal".to_string(),
        last_updated: 9,
        ..token("bonk", 1000.0, 1500.0)
    };

    let merged = merge_pair(&first, &second);
    assert_eq!(merged.address, "Bonk");
    assert_eq!(merged.name, "Bonk");
    assert_eq!(merged.symbol, "BONK");
    assert_eq!(merged.price, 0.00002);
    assert_eq!(merged.protocol, "raydium");
    assert_eq!(merged.source, "dexscreener");
    assert_eq!(merged.volume_24h, 1000.0);
    assert_eq!(merged.liquidity, 2000.0);
    assert_eq!(merged.market_cap, 300.0);
    assert_eq!(merged.transactions_24h, 10);
    assert_eq!(merged.last_updated, 9);
}

#[test]
fn test_merge_tokens_groups_case_insensitively_in_source_order() {
    let merged = merge_tokens(vec![
        vec![token("A", 1.0, 1.0), token("b", 2.0, 2.0)],
        vec![token("c", 3.0, 3.0), token("a", 9.0, 0.5)],
    ]);
    assert_eq!(addresses(&merged), vec!["A", "b", "c"]);
    assert_eq!(merged[0].volume_24h, 9.0);
    assert_eq!(merged[0].liquidity, 1.0);
}

#[test]
fn test_filter_by_min_volume() {
    let tokens = vec![token("low", 500.0, 0.0), token("high", 1000.0, 0.0)];
    let options = QueryOptions {
        min_volume: Some(750.0),
        ..Default::default()
    };
    assert_eq!(addresses(&filter(tokens, &options)), vec!["high"]);
}

#[test]
fn test_filter_is_monotonic() {
    let tokens: Vec<Token> = (0..20)
        .map(|i| token(&format!("t{}", i), i as f64 * 100.0, i as f64 * 7.0))
        .collect();

    let mut previous = usize::MAX;
    for threshold in [0.0, 150.0, 700.0, 1200.0, 5000.0] {
        let options = QueryOptions {
            min_volume: Some(threshold),
            min_liquidity: Some(threshold / 20.0),
            ..Default::default()
        };
        let size = filter(tokens.clone(), &options).len();
        assert!(size <= previous);
        previous = size;
    }
}

#[test]
fn test_absent_thresholds_do_not_filter() {
    let tokens = vec![token("zero", 0.0, 0.0), token("one", 1.0, 1.0)];
    assert_eq!(filter(tokens, &QueryOptions::default()).len(), 2);
}

#[test]
fn test_sort_by_volume_both_directions() {
    let mut tokens = vec![token("low", 500.0, 0.0), token("high", 1000.0, 0.0)];
    sort_tokens(&mut tokens, SortKey::Volume, SortOrder::Desc);
    assert_eq!(addresses(&tokens), vec!["high", "low"]);

    sort_tokens(&mut tokens, SortKey::Volume, SortOrder::Asc);
    assert_eq!(addresses(&tokens), vec!["low", "high"]);
}

#[test]
fn test_sort_by_price_change_uses_one_hour_window() {
    let mut tokens = vec![
        Token {
            price_change_1h: -2.0,
            price_change_24h: 50.0,
            ..token("a", 0.0, 0.0)
        },
        Token {
            price_change_1h: 3.0,
            ..token("b", 0.0, 0.0)
        },
    ];
    sort_tokens(&mut tokens, SortKey::PriceChange, SortOrder::Desc);
    assert_eq!(addresses(&tokens), vec!["b", "a"]);
}

#[tokio::test]
async fn test_pagination_round_trip() {
    let source = FakeSource::new("fake", vec![token("low", 500.0, 0.0), token("high", 1000.0, 0.0)]);
    let aggregator = aggregator_with(vec![source], memory_cache());

    let first = aggregator
        .aggregate(&QueryOptions {
            limit: Some(1),
            ..Default::default()
        })
        .await;
    assert_eq!(addresses(&first.tokens), vec!["high"]);
    assert_eq!(first.total_count, 2);
    let cursor = first.next_cursor.clone().expect("first page has a cursor");

    let second = aggregator
        .aggregate(&QueryOptions {
            limit: Some(1),
            cursor: Some(cursor),
            ..Default::default()
        })
        .await;
    assert_eq!(addresses(&second.tokens), vec!["low"]);
    assert_eq!(second.next_cursor, None);
    assert_eq!(second.total_count, 2);
}

#[tokio::test]
async fn test_cached_collection_serves_any_page_size() {
    let source = FakeSource::new(
        "fake",
        vec![token("a", 3.0, 0.0), token("b", 2.0, 0.0), token("c", 1.0, 0.0)],
    );
    let aggregator = aggregator_with(vec![source.clone()], memory_cache());

    let small = aggregator
        .aggregate(&QueryOptions {
            limit: Some(1),
            ..Default::default()
        })
        .await;
    let large = aggregator
        .aggregate(&QueryOptions {
            limit: Some(3),
            ..Default::default()
        })
        .await;

    assert_eq!(source.calls(), 1);
    assert_eq!(small.tokens.len(), 1);
    assert_eq!(large.tokens.len(), 3);
    assert_eq!(small.generated_at, large.generated_at);
}

#[tokio::test]
async fn test_cache_key_covers_sort_and_filters() {
    let store = Arc::new(MemoryStore::new());
    let cache = Cache::new(store.clone(), "tokens", Duration::from_secs(30));
    let source = FakeSource::new("fake", vec![token("a", 1000.0, 10.0)]);
    let aggregator = aggregator_with(vec![source.clone()], cache);

    let base = QueryOptions::default();
    aggregator.aggregate(&base).await;
    aggregator
        .aggregate(&QueryOptions {
            sort_by: Some(SortKey::Volume),
            sort_order: Some(SortOrder::Desc),
            limit: Some(5),
            ..Default::default()
        })
        .await;
    assert_eq!(source.calls(), 1);

    let variants = [
        QueryOptions {
            sort_by: Some(SortKey::Liquidity),
            ..Default::default()
        },
        QueryOptions {
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        },
        QueryOptions {
            min_volume: Some(1.0),
            ..Default::default()
        },
        QueryOptions {
            min_liquidity: Some(1.0),
            ..Default::default()
        },
    ];
    for options in &variants {
        aggregator.aggregate(options).await;
    }
    assert_eq!(source.calls(), 1 + variants.len());

    let key = format!("tokens:list:{}", base.fingerprint());
    assert!(store.get(&key).await.unwrap().is_some());
}

#[test_log::test(tokio::test)]
async fn test_partial_source_failure_is_contained() {
    let broken = FakeSource::failing("broken");
    let healthy = FakeSource::new("healthy", vec![token("low", 500.0, 0.0), token("high", 1000.0, 0.0)]);
    let aggregator = aggregator_with(vec![broken.clone(), healthy], memory_cache());

    let page = aggregator
        .aggregate(&QueryOptions {
            min_volume: Some(750.0),
            ..Default::default()
        })
        .await;

    assert_eq!(broken.calls(), 1);
    assert_eq!(addresses(&page.tokens), vec!["high"]);
    assert_eq!(page.total_count, 1);
}

#[tokio::test]
async fn test_total_outage_is_an_empty_page() {
    let aggregator = aggregator_with(
        vec![FakeSource::failing("one"), FakeSource::failing("two")],
        memory_cache(),
    );
    let page = aggregator.aggregate(&QueryOptions::default()).await;
    assert!(page.tokens.is_empty());
    assert_eq!(page.total_count, 0);
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn test_first_source_wins_identity_ties() {
    let first = FakeSource::new(
        "first",
        vec![Token {
            protocol: "raydium".to_string(),
            price: 2.0,
            ..token("shared", 10.0, 0.0)
        }],
    );
    let second = FakeSource::new(
        "second",
        vec![Token {
            protocol: "orca".to_string(),
            price: 3.0,
            ..token("SHARED", 40.0, 0.0)
        }],
    );
    let aggregator = aggregator_with(vec![first, second], memory_cache());

    let page = aggregator.aggregate(&QueryOptions::default()).await;
    assert_eq!(page.tokens.len(), 1);
    assert_eq!(page.tokens[0].protocol, "raydium");
    assert_eq!(page.tokens[0].price, 2.0);
    assert_eq!(page.tokens[0].volume_24h, 40.0);
}

#[tokio::test]
async fn test_invalidate_forces_a_fresh_fetch() {
    let source = FakeSource::new("fake", vec![token("a", 1.0, 0.0)]);
    let aggregator = aggregator_with(vec![source.clone()], memory_cache());

    aggregator.aggregate(&QueryOptions::default()).await;
    source.set_tokens(vec![token("a", 1.0, 0.0), token("b", 2.0, 0.0)]);
    assert_eq!(aggregator.aggregate(&QueryOptions::default()).await.total_count, 1);

    assert!(aggregator.invalidate().await > 0);
    assert_eq!(aggregator.aggregate(&QueryOptions::default()).await.total_count, 2);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_search_requires_a_query() {
    let aggregator = aggregator_with(vec![FakeSource::new("fake", Vec::new())], memory_cache());
    let err = aggregator
        .search("   ", &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
}

#[tokio::test]
async fn test_search_caches_per_query() {
    let source = FakeSource::new("fake", vec![token("bonk", 10.0, 0.0), token("wif", 20.0, 0.0)]);
    let aggregator = aggregator_with(vec![source.clone()], memory_cache());

    let bonk = aggregator.search("bonk", &QueryOptions::default()).await.unwrap();
    assert_eq!(addresses(&bonk.tokens), vec!["bonk"]);
    aggregator.search("bonk", &QueryOptions::default()).await.unwrap();
    assert_eq!(source.calls(), 1);

    let wif = aggregator.search("wif", &QueryOptions::default()).await.unwrap();
    assert_eq!(addresses(&wif.tokens), vec!["wif"]);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_get_by_address_falls_through_sources_and_caches() {
    let empty = FakeSource::new("empty", Vec::new());
    let holder = FakeSource::new("holder", vec![token("Mint", 5.0, 1.0)]);
    let aggregator = aggregator_with(vec![empty, holder.clone()], memory_cache());

    let found = aggregator.get_by_address("mint").await.unwrap();
    assert_eq!(found.map(|t| t.address), Some("Mint".to_string()));

    aggregator.get_by_address("MINT").await.unwrap();
    assert_eq!(holder.calls(), 1);

    assert_eq!(aggregator.get_by_address("other").await.unwrap(), None);
}

#[tokio::test]
async fn test_lookup_is_unmerged_whether_or_not_a_listing_ran() {
    let sources = || {
        vec![
            FakeSource::new("first", vec![token("Mint", 5.0, 1.0)]),
            FakeSource::new("second", vec![token("mint", 50.0, 9.0)]),
        ]
    };

    let cold = aggregator_with(sources(), memory_cache());
    let direct = cold.get_by_address("mint").await.unwrap().unwrap();

    let warm = aggregator_with(sources(), memory_cache());
    let listing = warm.aggregate(&QueryOptions::default()).await;
    assert_eq!(listing.tokens[0].volume_24h, 50.0);
    let after_listing = warm.get_by_address("mint").await.unwrap().unwrap();

    assert_eq!(direct.volume_24h, 5.0);
    assert_eq!(direct.liquidity, 1.0);
    assert_eq!(after_listing, direct);
}
