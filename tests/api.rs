use credibility_scan::api::routes::create_router;
use credibility_scan::config::Config;
use credibility_scan::error::FailureKind;
use credibility_scan::AppState;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEXT: &str = "Council approves new bridge after a decade of debate";

const ARTICLE: &str = r#"<html><body>
    <nav>Home</nav>
    <article><h1>Council approves bridge</h1><p>The vote passed 7-2 on Tuesday night.</p></article>
</body></html>"#;

/// Starts the service against `classifier` and returns its base URL.
async fn start(classifier: &MockServer) -> String {
    let endpoint = format!("{}/analyze/", classifier.uri());
    let config = Config::from_vars(move |name| match name {
        "CLASSIFIER_URL" => Some(endpoint.clone()),
        "REQUEST_TIMEOUT_SECS" => Some("2".to_string()),
        "PAGE_FETCH_TIMEOUT_SECS" => Some("2".to_string()),
        _ => None,
    })
    .unwrap();

    let app = create_router(AppState::new(config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    format!("http://{}", addr)
}

async fn mount_verdict(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/analyze/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "final_assessment": "Highly trustworthy content",
            "level": "high",
            "score": 0.81
        })))
        .mount(server)
        .await;
}

async fn analyze(base: &str, text: &str) -> (u16, Value) {
    let res = reqwest::Client::new()
        .post(format!("{}/api/messages", base))
        .json(&json!({
            "action": "analyze",
            "text": text,
            "sourceUrl": "https://news.example/bridge"
        }))
        .send()
        .await
        .unwrap();
    let status = res.status().as_u16();
    (status, res.json().await.unwrap())
}

async fn stats(base: &str) -> Value {
    let body: Value = reqwest::get(format!("{}/api/stats", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["data"].clone()
}

#[tokio::test]
async fn analyze_message_returns_verdict_and_caches_it() {
    let classifier = MockServer::start().await;
    mount_verdict(&classifier).await;
    let base = start(&classifier).await;

    let (status, body) = analyze(&base, TEXT).await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "success": true,
            "data": { "rating": "Highly trustworthy content", "score": 0.81, "sourceUrl": null }
        })
    );

    let (_, again) = analyze(&base, TEXT).await;
    assert_eq!(again, body);

    let stats = stats(&base).await;
    assert_eq!(stats["network_calls"], 1);
    assert_eq!(stats["cache_hits"], 1);
    assert_eq!(stats["cached"], 1);
    assert_eq!(classifier.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn short_text_fails_without_reaching_the_classifier() {
    let classifier = MockServer::start().await;
    mount_verdict(&classifier).await;
    let base = start(&classifier).await;

    let (status, body) = analyze(&base, "Short").await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "EmptyInput");
    assert!(classifier.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let classifier = MockServer::start().await;
    let base = start(&classifier).await;

    let res = reqwest::Client::new()
        .post(format!("{}/api/messages", base))
        .json(&json!({ "action": "autoDetectPage", "url": "https://news.example" }))
        .send()
        .await
        .unwrap();

    assert!(res.status().is_client_error());
}

#[tokio::test]
async fn scan_fetches_extracts_and_assesses_a_page() {
    let classifier = MockServer::start().await;
    mount_verdict(&classifier).await;
    Mock::given(method("GET"))
        .and(path("/2024/05/01/bridge"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
        .mount(&classifier)
        .await;
    let base = start(&classifier).await;

    let res = reqwest::Client::new()
        .post(format!("{}/api/scan", base))
        .json(&json!({ "url": format!("{}/2024/05/01/bridge", classifier.uri()) }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["meta"]["status"], "success");
    assert_eq!(body["data"]["result"]["rating"], "Highly trustworthy content");
    assert_eq!(body["data"]["word_count"], 10);

    let analyze_calls: Vec<Value> = classifier
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/analyze/")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(analyze_calls.len(), 1);
    assert_eq!(
        analyze_calls[0]["text"],
        "Council approves bridge The vote passed 7-2 on Tuesday night."
    );
}

#[tokio::test]
async fn scan_reports_unfetchable_and_empty_pages() {
    let classifier = MockServer::start().await;
    mount_verdict(&classifier).await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html><body></body></html>", "text/html"))
        .mount(&classifier)
        .await;
    let base = start(&classifier).await;
    let client = reqwest::Client::new();

    let missing = client
        .post(format!("{}/api/scan", base))
        .json(&json!({ "url": format!("{}/missing", classifier.uri()) }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 400);

    let empty = client
        .post(format!("{}/api/scan", base))
        .json(&json!({ "url": format!("{}/empty", classifier.uri()) }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status().as_u16(), 422);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["meta"]["status"], "error");
}

#[tokio::test]
async fn scan_surfaces_classifier_failures() {
    let classifier = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze/"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&classifier)
        .await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
        .mount(&classifier)
        .await;
    let base = start(&classifier).await;

    let res = reqwest::Client::new()
        .post(format!("{}/api/scan", base))
        .json(&json!({ "url": format!("{}/story", classifier.uri()) }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 502);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["meta"]["message"], FailureKind::BadResponse.user_message());
}

#[tokio::test]
async fn slow_classifier_surfaces_as_timeout() {
    let classifier = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&classifier)
        .await;
    let base = start(&classifier).await;

    let (_, body) = analyze(&base, TEXT).await;

    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "Timeout");
}

#[tokio::test]
async fn clearing_the_cache_reports_evictions() {
    let classifier = MockServer::start().await;
    mount_verdict(&classifier).await;
    let base = start(&classifier).await;

    analyze(&base, TEXT).await;
    let body: Value = reqwest::Client::new()
        .delete(format!("{}/api/cache", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["cleared"], 1);

    analyze(&base, TEXT).await;
    assert_eq!(stats(&base).await["network_calls"], 2);
}
