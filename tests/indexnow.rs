use harvester::{
    config::IndexNowConfig,
    notify::{IndexNowDispatcher, MAX_BATCH, NotifyError, SearchNotifier},
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

fn dispatcher(endpoints: Vec<String>) -> IndexNowDispatcher {
    let config = IndexNowConfig {
        key: "abc123".to_string(),
        endpoints,
    };
    IndexNowDispatcher::new(&config, "https://reader.example.com/").unwrap()
}

#[tokio::test]
async fn submits_the_indexnow_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/indexnow"))
        .and(body_json(json!({
            "host": "reader.example.com",
            "key": "abc123",
            "keyLocation": "https://reader.example.com/abc123.txt",
            "urlList": ["https://reader.example.com/articles/inside-a-query-planner"]
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(vec![format!("{}/indexnow", server.uri())])
        .notify_batch(&["https://reader.example.com/articles/inside-a-query-planner".to_string()])
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.results[0].status, Some(202));
}

#[tokio::test]
async fn one_engine_failing_does_not_hide_the_other() {
    let healthy = MockServer::start().await;
    let broken = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&healthy)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("try later"))
        .mount(&broken)
        .await;

    let report = dispatcher(vec![
        format!("{}/indexnow", healthy.uri()),
        format!("{}/indexnow", broken.uri()),
    ])
    .notify_batch(&["https://reader.example.com/articles/a".to_string()])
    .await
    .unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.succeeded(), 1);
    assert!(!report.all_succeeded());

    let failed = &report.results[1];
    assert!(!failed.success);
    assert_eq!(failed.status, Some(500));
    assert!(failed.error.as_deref().unwrap().contains("try later"));
}

#[tokio::test]
async fn rejects_empty_and_oversized_batches_without_calling_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let notifier = dispatcher(vec![format!("{}/indexnow", server.uri())]);

    let empty = notifier.notify_batch(&[]).await;
    assert!(matches!(empty, Err(NotifyError::Validation(_))));

    let too_many: Vec<String> = (0..=MAX_BATCH)
        .map(|i| format!("https://reader.example.com/articles/{i}"))
        .collect();
    let oversized = notifier.notify_batch(&too_many).await;
    assert!(matches!(oversized, Err(NotifyError::Validation(_))));
}
