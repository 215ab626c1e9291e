use std::fs;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use blog_cache::application::blog::BlogService;
use blog_cache::cache::{CacheConfig, ContentCache, MemoryStore};
use blog_cache::content::MarkdownDirectorySource;
use blog_cache::infra::http::{ApiState, build_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    content: TempDir,
}

fn write_article(root: &TempDir, relative: &str, body: &str) {
    let path = root.path().join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create category dir");
    }
    fs::write(path, body).expect("write article");
}

fn seeded_content() -> TempDir {
    let content = TempDir::new().expect("tempdir");
    write_article(
        &content,
        "rust/ownership.md",
        "# Ownership\n\nMoves and borrows explained.\n\n<!-- tags: rust, memory -->\n\n## Borrowing\n\nShared and mutable references.\n\nSee [tokio](/blog/article/rust/tokio).\n",
    );
    write_article(
        &content,
        "rust/tokio.md",
        "# Tokio\n\nAn async runtime.\n\n<!-- tags: async -->\n\n```mermaid\ngraph TD; A-->B;\n```\n",
    );
    write_article(&content, "go/channels.md", "# Channels\n\nCommunicating sequential processes.\n");
    content
}

fn app_with(cache: ContentCache, store: Arc<MemoryStore>) -> TestApp {
    let content = seeded_content();
    let source = MarkdownDirectorySource::new(content.path());
    let blog = BlogService::new(Arc::new(cache), Arc::new(source));
    TestApp {
        router: build_router(ApiState::new(Arc::new(blog))),
        store,
        content,
    }
}

fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let cache = ContentCache::with_store(store.clone(), &CacheConfig::default());
    app_with(cache, store)
}

async fn call(app: &TestApp, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, request).await
}

async fn post_json(app: &TestApp, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request should build");
    send(app, request).await
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let body = serde_json::from_slice(&bytes).expect("body should be json");
    (status, body)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    call(app, Method::GET, uri).await
}

#[tokio::test]
async fn categories_are_cached_after_first_request() {
    let app = app();

    let (status, body) = get(&app, "/api/v1/blog/categories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["cached"], false);
    let names: Vec<&str> = body["data"]
        .as_array()
        .expect("categories array")
        .iter()
        .map(|c| c["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, ["go", "rust"]);
    assert_eq!(body["data"][1]["count"], 2);

    let (_, body) = get(&app, "/api/v1/blog/categories").await;
    assert_eq!(body["cached"], true);

    let (_, body) = get(&app, "/api/v1/blog/categories?clear_cache=true").await;
    assert_eq!(body["cached"], false);
}

#[tokio::test]
async fn article_lists_filter_and_cache() {
    let app = app();

    let (status, body) = get(&app, "/api/v1/blog/articles?category=rust").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], false);
    assert_eq!(body["data"].as_array().expect("list").len(), 2);
    assert!(body["data"][0].get("content").is_none());

    let (_, body) = get(&app, "/api/v1/blog/articles?category=rust").await;
    assert_eq!(body["cached"], true);

    let (_, body) = get(&app, "/api/v1/blog/articles?search=SEQUENTIAL").await;
    assert_eq!(body["data"].as_array().expect("list").len(), 1);
    assert_eq!(body["data"][0]["id"], "go/channels");

    let (_, body) = get(&app, "/api/v1/blog/articles?tag=async").await;
    assert_eq!(body["data"][0]["id"], "rust/tokio");
    let (_, body) = get(&app, "/api/v1/blog/articles?tag=async").await;
    assert_eq!(body["cached"], false);
}

#[tokio::test]
async fn article_detail_renders_markdown() {
    let app = app();

    let (status, body) = get(&app, "/api/v1/blog/articles/rust/ownership").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], false);

    let data = &body["data"];
    assert_eq!(data["id"], "rust/ownership");
    assert_eq!(data["title"], "Ownership");
    assert_eq!(data["reading_time"], 1);
    assert_eq!(data["tags"], serde_json::json!(["rust", "memory"]));
    let html = data["html_content"].as_str().expect("html");
    assert!(html.contains("id=\"borrowing\""));
    assert!(html.contains("data-article-id=\"rust/tokio\""));
    assert_eq!(data["headings"][1]["anchor"], "borrowing");

    let (_, body) = get(&app, "/api/v1/blog/articles/rust/ownership").await;
    assert_eq!(body["cached"], true);
}

#[tokio::test]
async fn mermaid_blocks_become_diagram_containers() {
    let app = app();
    let (_, body) = get(&app, "/api/v1/blog/articles/rust/tokio").await;
    let html = body["data"]["html_content"].as_str().expect("html");
    assert!(html.contains("class=\"mermaid\""));
    assert!(html.contains("id=\"mermaid-"));
}

#[tokio::test]
async fn unknown_article_is_a_json_404() {
    let app = app();
    let (status, body) = get(&app, "/api/v1/blog/articles/rust/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn traversal_ids_are_rejected() {
    let app = app();
    let (status, body) = get(&app, "/api/v1/blog/articles/rust/..%2F..%2Fsecret").await;
    assert!(status.is_client_error(), "status {status}");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn cache_administration_endpoints() {
    let app = app();
    get(&app, "/api/v1/blog/categories").await;
    get(&app, "/api/v1/blog/articles/go/channels").await;

    let (status, body) = get(&app, "/api/v1/blog/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], true);
    assert_eq!(body["data"]["prefix"], "blog:");
    assert_eq!(body["data"]["key_count"], 3);
    assert_eq!(body["data"]["ttl_table"]["categories"], 3600);

    let (status, body) = call(&app, Method::POST, "/api/v1/blog/cache/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared_keys"], 3);
    assert!(app.store.is_empty());

    let (status, body) = call(&app, Method::POST, "/api/v1/blog/cache/warmup").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success"], true);
    assert_eq!(body["data"]["categories_count"], 2);
    assert_eq!(body["data"]["articles_count"], 3);

    let (_, body) = get(&app, "/api/v1/blog/articles?category=go").await;
    assert_eq!(body["cached"], true);
}

#[tokio::test]
async fn invalidate_endpoint_drops_one_article() {
    let app = app();
    get(&app, "/api/v1/blog/articles/go/channels").await;
    get(&app, "/api/v1/blog/articles/rust/tokio").await;
    get(&app, "/api/v1/blog/articles?category=go").await;

    let (status, body) = post_json(
        &app,
        "/api/v1/blog/cache/invalidate",
        json!({"article_id": "go/channels", "category": "go"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // detail, rendered HTML and the category's list
    assert_eq!(body["data"]["removed_keys"], 3);

    let (_, body) = get(&app, "/api/v1/blog/articles/go/channels").await;
    assert_eq!(body["cached"], false);
    let (_, body) = get(&app, "/api/v1/blog/articles/rust/tokio").await;
    assert_eq!(body["cached"], true);

    let (status, body) = post_json(
        &app,
        "/api/v1/blog/cache/invalidate",
        json!({"category": "go"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed_keys"], 0);
}

#[tokio::test]
async fn invalidate_without_target_is_rejected() {
    let app = app();
    let (status, body) = post_json(&app, "/api/v1/blog/cache/invalidate", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn reads_succeed_while_the_store_is_down() {
    let app = app();
    get(&app, "/api/v1/blog/categories").await;
    app.store.set_unreachable(true);

    let (status, body) = get(&app, "/api/v1/blog/categories").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], false);

    let (status, _) = get(&app, "/api/v1/blog/articles/go/channels").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/api/v1/blog/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["available"], false);
}

#[tokio::test]
async fn disabled_cache_reports_unavailable_administration() {
    let store = Arc::new(MemoryStore::new());
    let app = app_with(ContentCache::disabled(&CacheConfig::default()), store);

    let (status, body) = get(&app, "/api/v1/blog/articles").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().expect("list").len(), 3);

    let (status, body) = call(&app, Method::POST, "/api/v1/blog/cache/clear").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);

    let (status, body) = call(&app, Method::POST, "/api/v1/blog/cache/warmup").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(app.content.path().exists());
}
