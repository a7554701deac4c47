//! End-to-end tests for single-keyword rank searches.
//!
//! Each test scripts a `MemorySite` with result pages registered under the
//! exact URLs the crawler builds, then runs `RankCrawler::find_rank*` against
//! it. Time is paused so settle polling and backoff sleeps are instant.

use std::time::Duration;

use place_rank::{CrawlerConfig, Error, MemorySite, NormalizedGraph, RankCrawler, SitePage};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fixtures
// ============================================================================

fn list_query_key(keyword: &str, start: u64) -> String {
    format!(r#"restaurantList({{"input":{{"query":"{keyword}","start":{start}}}}})"#)
}

/// One result page in the site's normalized-cache shape.
fn page_json(keyword: &str, start: u64, ids: &[&str], total: u64) -> Value {
    let mut root = Map::new();
    root.insert("__typename".into(), json!("Query"));

    let mut cache = Map::new();
    let mut items = Vec::new();
    for id in ids {
        let key = format!("RestaurantListSummary:{id}");
        items.push(json!({ "__ref": key }));
        cache.insert(
            key,
            json!({
                "__typename": "RestaurantListSummary",
                "id": id,
                "name": format!("Place {id}"),
                "category": "카페",
                "visitorReviewScore": "4.41",
                "visitorReviewCount": "1,024",
                "roadAddress": "서울 강남구 테헤란로 1",
            }),
        );
    }

    root.insert(list_query_key(keyword, start), json!({ "total": total, "items": items }));
    cache.insert("ROOT_QUERY".into(), Value::Object(root));
    Value::Object(cache)
}

fn result_page(keyword: &str, start: u64, ids: &[&str], total: u64) -> NormalizedGraph {
    NormalizedGraph::from_json(page_json(keyword, start, ids, total)).unwrap()
}

fn filler(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}")).collect()
}

fn fast_config() -> CrawlerConfig {
    let mut config = CrawlerConfig::default();
    config.retry.jitter = false;
    config
}

/// Register `pages` (page number → ids) for `keyword`.
fn publish(site: &MemorySite, crawler: &RankCrawler<MemorySite>, keyword: &str, pages: &[Vec<String>]) {
    let rpp = u64::from(crawler.config().results_per_page);
    for (index, ids) in pages.iter().enumerate() {
        let page = index as u32 + 1;
        let start = u64::from(page - 1) * rpp + 1;
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        site.put_page(
            crawler.search_url(keyword, page).unwrap(),
            SitePage::with_graph(result_page(keyword, start, &ids, 150)),
        );
    }
}

// ============================================================================
// 1. Found on a later page
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_target_on_second_page() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();

    let mut page2 = vec!["a1".to_string(), "a2".to_string(), "12345".to_string()];
    page2.extend(filler("b", 12));
    publish(&site, &crawler, "coffee shop", &[filler("p", 15), page2]);

    let result = crawler.find_rank("coffee shop", "12345").await.unwrap();

    assert_eq!(result.rank, Some(18));
    assert_eq!(result.page, Some(2));
    assert_eq!(result.pages_searched, 2);
    assert_eq!(result.total_results, Some(150));
    assert_eq!(site.navigations(), 2);

    let entity = result.entity.unwrap();
    assert_eq!(entity.local_rank, 3);
    assert_eq!(entity.name, "Place 12345");
    assert_eq!(entity.review_count, 1024);
    assert!((entity.rating - 4.41).abs() < 1e-9);

    assert_eq!(site.sessions_opened(), 1);
    assert_eq!(site.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_found_on_first_page_stops_paging() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    publish(&site, &crawler, "latte", &[vec!["777".into()], filler("x", 15)]);

    let result = crawler.find_rank("latte", "777").await.unwrap();

    assert_eq!(result.rank, Some(1));
    assert_eq!(site.navigations(), 1);
}

// ============================================================================
// 2. Not found
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_not_found_searches_exactly_max_pages() {
    let site = MemorySite::new();
    let mut config = fast_config();
    config.max_pages = 3;
    let crawler = RankCrawler::new(site.clone(), config).unwrap();
    publish(
        &site,
        &crawler,
        "tea",
        &[filler("a", 15), filler("b", 15), filler("c", 15), filler("d", 15)],
    );

    let result = crawler.find_rank("tea", "nope").await.unwrap();

    assert_eq!(result.rank, None);
    assert_eq!(result.page, None);
    assert_eq!(result.pages_searched, 3);
    assert_eq!(result.total_results, Some(150));
    assert_eq!(site.navigations(), 3);
    assert_eq!(site.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_page_ends_search_early() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    publish(&site, &crawler, "mocha", &[filler("a", 15)]);

    let result = crawler.find_rank("mocha", "nope").await.unwrap();

    assert_eq!(result.rank, None);
    assert_eq!(result.pages_searched, 2);
    assert_eq!(site.navigations(), 2);
}

// ============================================================================
// 3. Resolution details
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_dangling_reference_does_not_count_toward_rank() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();

    let mut raw = page_json("bagel", 1, &["1", "2", "3"], 3);
    raw["ROOT_QUERY"][list_query_key("bagel", 1).as_str()]["items"] = json!([
        {"__ref": "RestaurantListSummary:gone"},
        {"__ref": "RestaurantListSummary:1"},
        {"__ref": "RestaurantListSummary:2"},
        {"__ref": "RestaurantListSummary:3"},
    ]);
    let graph = NormalizedGraph::from_json(raw).unwrap();

    site.put_page(crawler.search_url("bagel", 1).unwrap(), SitePage::with_graph(graph));

    let result = crawler.find_rank("bagel", "2").await.unwrap();
    assert_eq!(result.rank, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_late_population_is_waited_for() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    site.put_page(
        crawler.search_url("scone", 1).unwrap(),
        SitePage::with_graph(result_page("scone", 1, &["9", "42"], 2)).populated_after(3),
    );

    let result = crawler.find_rank("scone", "42").await.unwrap();

    assert_eq!(result.rank, Some(2));
    assert_eq!(site.navigations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_population_after_settle_timeout_reads_as_empty() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    site.put_page(
        crawler.search_url("scone", 1).unwrap(),
        SitePage::with_graph(result_page("scone", 1, &["42"], 1)).populated_after(1_000),
    );

    let result = crawler.find_rank("scone", "42").await.unwrap();

    assert_eq!(result.rank, None);
    assert_eq!(result.pages_searched, 1);
}

// ============================================================================
// 4. Retries and circuit breaker
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    publish(&site, &crawler, "donut", &[vec!["5".into()]]);
    site.fail_navigations("query=donut", 2);

    let result = crawler.find_rank("donut", "5").await.unwrap();

    assert_eq!(result.rank, Some(1));
    assert_eq!(site.navigations(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_the_search() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    site.fail_always("query=donut");

    let err = crawler.find_rank("donut", "5").await.unwrap_err();

    match err {
        Error::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, Error::Navigation { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(site.navigations(), 3);
    assert_eq!(site.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_and_recovers() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    publish(&site, &crawler, "donut", &[vec!["5".into()]]);
    site.fail_navigations("query=donut", 5);

    // 3 failures, then 2 more open the circuit mid-retry.
    assert!(matches!(crawler.find_rank("donut", "5").await, Err(Error::ExhaustedRetries { .. })));
    assert!(matches!(crawler.find_rank("donut", "5").await, Err(Error::CircuitOpen { .. })));
    assert_eq!(site.navigations(), 5);
    assert_eq!(crawler.breaker().state(), place_rank::CircuitState::Open);

    // Short-circuited: no navigation reaches the site.
    assert!(matches!(crawler.find_rank("donut", "5").await, Err(Error::CircuitOpen { .. })));
    assert_eq!(site.navigations(), 5);

    tokio::time::advance(Duration::from_secs(61)).await;
    let result = crawler.find_rank("donut", "5").await.unwrap();
    assert_eq!(result.rank, Some(1));
    assert_eq!(crawler.breaker().state(), place_rank::CircuitState::Closed);

    assert_eq!(site.sessions_opened(), 4);
    assert_eq!(site.sessions_closed(), 4);
}

// ============================================================================
// 5. Deadlines and cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_and_closes_session() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    site.set_latency(Duration::from_secs(10));

    let started = Instant::now();
    let err = crawler
        .find_rank_until("espresso", "1", started + Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(site.sessions_opened(), 1);
    assert_eq!(site.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_search_closes_session() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    site.set_latency(Duration::from_secs(10));
    let cancel = CancellationToken::new();

    let (out, ()) = tokio::join!(crawler.find_rank_cancellable("espresso", "1", &cancel, None), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
    });

    assert!(matches!(out, Err(Error::Cancelled)));
    assert_eq!(site.sessions_closed(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_opens_nothing() {
    let site = MemorySite::new();
    let crawler = RankCrawler::new(site.clone(), fast_config()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let out = crawler.find_rank_cancellable("espresso", "1", &cancel, None).await;

    assert!(matches!(out, Err(Error::Cancelled)));
    assert_eq!(site.sessions_opened(), 0);
}

// ============================================================================
// 6. Configuration
// ============================================================================

#[test]
fn test_invalid_config_rejected() {
    let mut config = CrawlerConfig::default();
    config.max_pages = 0;
    assert!(matches!(RankCrawler::new(MemorySite::new(), config), Err(Error::Config(_))));
}

#[test]
fn test_custom_page_size_changes_urls() {
    let config = CrawlerConfig::from_json_str(r#"{"resultsPerPage": 20}"#).unwrap();
    let crawler = RankCrawler::new(MemorySite::new(), config).unwrap();
    assert!(crawler.search_url("coffee", 3).unwrap().ends_with("start=41"));
}
