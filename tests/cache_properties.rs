use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use blog_cache::cache::{
    CacheConfig, ContentCache, ContentKind, DEFAULT_PREFIX, KeyBuilder, KeyValueStore, Lookup,
    MemoryStore, decode, derive_key, encode,
};
use blog_cache::domain::articles::{Article, ArticleDetail, CategoryMap, CategorySummary};
use serde_json::{Value, json};

fn memory_cache() -> (Arc<MemoryStore>, ContentCache) {
    let store = Arc::new(MemoryStore::new());
    let cache = ContentCache::with_store(store.clone(), &CacheConfig::default());
    (store, cache)
}

fn article(id: &str, category: &str) -> Article {
    Article {
        id: id.to_string(),
        title: format!("Title {id}"),
        description: "summary".to_string(),
        category: Some(category.to_string()),
        tags: vec!["notes".to_string()],
        content: None,
        created_at: None,
        updated_at: None,
        reading_time: 1,
        word_count: 300,
    }
}

fn detail(id: &str) -> ArticleDetail {
    ArticleDetail {
        article: Article {
            content: Some("# Heading".to_string()),
            ..article(id, "Go")
        },
        html_content: "<h1 id=\"heading\">Heading</h1>".to_string(),
        headings: Vec::new(),
    }
}

fn summaries() -> Vec<CategorySummary> {
    let mut map = CategoryMap::new();
    map.insert("Go".to_string(), vec![article("go/a", "Go")]);
    CategorySummary::from_map(&map)
}

#[test]
fn keys_are_deterministic() {
    let first = derive_key(DEFAULT_PREFIX, ContentKind::Articles, &["Go", "channels"]);
    let second = derive_key(DEFAULT_PREFIX, ContentKind::Articles, &["Go", "channels"]);
    assert_eq!(first, second);

    // Stable across processes: pinned to the SHA-256 of "Go:channels".
    let builder = KeyBuilder::new(DEFAULT_PREFIX);
    assert_eq!(builder.articles("Go", "channels"), first);
    assert_eq!(first.as_str(), "blog:articles:073b8076");
}

#[test]
fn distinct_parameters_rarely_collide() {
    let keys: HashSet<String> = (0..10_000)
        .map(|i| {
            let id = format!("article-{i}");
            derive_key(DEFAULT_PREFIX, ContentKind::ArticleDetail, &[&id]).into_string()
        })
        .collect();

    // 32-bit digests over 10k tuples expect ~0.01 collisions.
    let collisions = 10_000 - keys.len();
    assert!(collisions <= 2, "unexpected collisions: {collisions}");
}

#[test]
fn nested_values_round_trip() {
    let value = json!({
        "categories": [{"name": "Go", "count": 3, "articles": []}],
        "flags": [true, false, null],
        "ratio": 1.25,
        "label": "blog",
    });
    let decoded: Value = decode(&encode(&value).expect("encode")).expect("decode");
    assert_eq!(decoded, value);
}

#[tokio::test]
async fn categories_entry_carries_ttl() {
    let (store, cache) = memory_cache();
    cache.set_categories(&summaries()).await.expect("set");

    let ttl = store
        .ttl(cache.keys().categories().as_str())
        .await
        .expect("ttl")
        .expect("entry has expiry");
    assert!(ttl <= Duration::from_secs(3600));
    assert!(ttl > Duration::ZERO);
}

async fn exercise_every_operation(cache: &ContentCache) {
    assert!(cache.get::<Value>("blog:categories").await.into_option().is_none());
    assert!(cache.set("blog:categories", &json!([]), None).await.is_err());
    assert!(cache.delete("blog:categories").await.is_err());
    assert!(cache.delete_matching("blog:*").await.is_err());

    assert!(cache.get_categories().await.into_option().is_none());
    assert!(cache.set_categories(&summaries()).await.is_err());
    assert!(cache.get_articles("Go", "").await.into_option().is_none());
    assert!(cache.set_articles(&[article("go/a", "Go")], "Go", "").await.is_err());
    assert!(cache.get_article("go/a").await.into_option().is_none());
    assert!(cache.set_article("go/a", &detail("go/a")).await.is_err());
    assert!(cache.get_article_html("go/a", "abc").await.into_option().is_none());
    assert!(cache.set_article_html("go/a", "<p/>", "abc").await.is_err());

    assert!(cache.invalidate_article("go/a").await.is_err());
    assert!(cache.invalidate_category("Go").await.is_err());
    assert!(cache.invalidate_category("").await.is_err());
    assert!(cache.invalidate_all().await.is_err());

    let stats = cache.stats().await;
    assert!(!stats.available);
    assert!(stats.message.is_some());

    let produced = cache
        .read_through("blog:categories", None, || async {
            Ok::<_, String>(json!(["fresh"]))
        })
        .await
        .expect("producer result");
    assert!(!produced.cached);

    let report = cache
        .warm_up(
            || async { Ok::<_, String>(CategoryMap::new()) },
            || async { Ok::<_, String>(Vec::new()) },
        )
        .await;
    assert!(!report.success);
}

#[tokio::test]
async fn degraded_cache_never_panics() {
    exercise_every_operation(&ContentCache::disabled(&CacheConfig::default())).await;
}

#[tokio::test]
async fn unreachable_store_never_panics() {
    let (store, cache) = memory_cache();
    cache.set_categories(&summaries()).await.expect("seed");
    store.set_unreachable(true);

    let lookup = cache.get_categories().await;
    assert!(lookup.is_failed());
    exercise_every_operation(&cache).await;
}

#[tokio::test]
async fn category_invalidation_is_scoped() {
    let (_, cache) = memory_cache();
    cache
        .set_articles(&[article("a/1", "A")], "A", "")
        .await
        .expect("set A");
    cache
        .set_articles(&[article("b/1", "B")], "B", "")
        .await
        .expect("set B");

    let removed = cache.invalidate_category("A").await.expect("invalidate");
    assert_eq!(removed, 1);
    assert!(matches!(cache.get_articles("A", "").await, Lookup::Miss));

    let remaining = cache.get_articles("B", "").await.into_option().expect("B");
    assert_eq!(remaining[0].id, "b/1");
}

#[tokio::test]
async fn invalidate_all_counts_every_entry_written() {
    let (store, cache) = memory_cache();
    cache.set_categories(&summaries()).await.expect("categories");
    cache
        .set_articles(&[article("go/a", "Go")], "", "")
        .await
        .expect("all articles");
    cache
        .set_articles(&[article("go/a", "Go")], "Go", "")
        .await
        .expect("go articles");
    cache.set_article("go/a", &detail("go/a")).await.expect("detail");

    let removed = cache.invalidate_all().await.expect("invalidate");
    assert_eq!(removed, 4);
    assert!(store.is_empty());

    assert!(matches!(cache.get_categories().await, Lookup::Miss));
    assert!(matches!(cache.get_articles("", "").await, Lookup::Miss));
    assert!(matches!(cache.get_articles("Go", "").await, Lookup::Miss));
    assert!(matches!(cache.get_article("go/a").await, Lookup::Miss));
}

#[tokio::test]
async fn failing_article_producer_keeps_categories_readable() {
    let (_, cache) = memory_cache();
    let mut categories = CategoryMap::new();
    categories.insert("Go".to_string(), vec![article("go/a", "Go")]);

    let report = cache
        .warm_up(
            || async { Ok::<_, String>(categories) },
            || async { Err::<Vec<Article>, _>("database offline".to_string()) },
        )
        .await;

    assert!(!report.success);
    assert!(report.message.contains("database offline"));
    let cached = cache.get_categories().await.into_option().expect("categories");
    assert_eq!(cached[0].name, "Go");
    assert!(matches!(cache.get_articles("", "").await, Lookup::Miss));
}

#[tokio::test(start_paused = true)]
async fn entries_disappear_after_ttl() {
    let (_, cache) = memory_cache();
    let value = json!([{"name": "Go", "count": 3}]);
    cache
        .set("blog:categories", &value, Some(Duration::from_secs(3600)))
        .await
        .expect("set");

    let lookup: Lookup<Value> = cache.get("blog:categories").await;
    assert_eq!(lookup.into_option(), Some(value));

    tokio::time::advance(Duration::from_secs(3601)).await;
    assert!(matches!(
        cache.get::<Value>("blog:categories").await,
        Lookup::Miss
    ));
}
