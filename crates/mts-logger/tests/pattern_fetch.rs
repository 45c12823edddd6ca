//! Pattern sourcing against a mock endpoint, and end-to-end logging

use mts_core::{CorrelationId, PiiPattern};
use mts_logger::{
    LogSink, Logger, LoggerConfig, LoggerError, MemorySink, PatternSource, RuntimeEnvironment,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn email() -> PiiPattern {
    PiiPattern::new("email", r"[\w+.-]+@[\w.-]+\.\w{2,}", "[REDACTED-EMAIL]")
}

async fn serve(body: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pii-patterns"))
        .respond_with(body)
        .mount(&server)
        .await;
    server
}

fn url(server: &MockServer) -> String {
    format!("{}/pii-patterns", server.uri())
}

fn remote_patterns() -> serde_json::Value {
    json!([
        {"name": "email", "pattern": "[\\w+.-]+@[\\w.-]+\\.\\w{2,}", "replacement": "[EMAIL]"},
        {"name": "ticket", "pattern": "TCK-\\d+", "replacement": "[TICKET]"}
    ])
}

fn logger(config: LoggerConfig) -> (Logger, MemorySink) {
    let sink = MemorySink::new();
    let logger = Logger::new();
    let shared: Arc<dyn LogSink> = Arc::new(sink.clone());
    assert!(logger.initialize(config.with_sink(shared)));
    (logger, sink)
}

#[tokio::test]
async fn test_fetch_valid_patterns() {
    let server = serve(ResponseTemplate::new(200).set_body_json(remote_patterns())).await;

    let patterns = PatternSource::new(url(&server)).fetch().await.unwrap();
    assert_eq!(patterns.len(), 2);
    assert_eq!(patterns[1].name, "ticket");
}

#[tokio::test]
async fn test_fetch_http_error() {
    let server = serve(ResponseTemplate::new(503)).await;

    let err = PatternSource::new(url(&server)).fetch().await.unwrap_err();
    assert!(matches!(err, LoggerError::Http { status: 503 }));
}

#[tokio::test]
async fn test_fetch_wrong_shape() {
    let server = serve(ResponseTemplate::new(200).set_body_json(json!({"patterns": []}))).await;

    let err = PatternSource::new(url(&server)).fetch().await.unwrap_err();
    assert!(matches!(err, LoggerError::Shape(_)));
}

#[tokio::test]
async fn test_fetch_empty_list() {
    let server = serve(ResponseTemplate::new(200).set_body_json(json!([]))).await;

    let err = PatternSource::new(url(&server)).fetch().await.unwrap_err();
    assert!(matches!(err, LoggerError::EmptyPatternSet));
}

#[tokio::test]
async fn test_fetch_invalid_regex() {
    let body = json!([
        {"name": "ok", "pattern": "a+", "replacement": "[A]"},
        {"name": "broken", "pattern": "(", "replacement": "[B]"}
    ]);
    let server = serve(ResponseTemplate::new(200).set_body_json(body)).await;

    let err = PatternSource::new(url(&server)).fetch().await.unwrap_err();
    match err {
        LoggerError::Patterns(e) => assert_eq!(e.index, 1),
        other => panic!("expected pattern error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_times_out() {
    let server = serve(
        ResponseTemplate::new(200)
            .set_body_json(remote_patterns())
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let err = PatternSource::new(url(&server))
        .with_timeout(Duration::from_millis(50))
        .fetch()
        .await
        .unwrap_err();
    assert!(matches!(err, LoggerError::FetchTimeout(_)));
}

#[tokio::test]
async fn test_refresh_upgrades_patterns() {
    let server = serve(ResponseTemplate::new(200).set_body_json(remote_patterns())).await;
    let (logger, sink) = logger(
        LoggerConfig::new("api")
            .with_patterns(vec![email()])
            .with_patterns_url(url(&server)),
    );

    assert_eq!(logger.refresh_patterns().await.unwrap(), 2);
    assert_eq!(logger.active_pattern_count(), 2);

    logger.info("Ticket TCK-991 from a@b.io", None);
    let entries = sink.entries();
    assert_eq!(entries.last().unwrap()["message"], "Ticket [TICKET] from [EMAIL]");
}

#[tokio::test]
async fn test_failed_refresh_keeps_baseline() {
    let server = serve(ResponseTemplate::new(500)).await;
    let (logger, sink) = logger(
        LoggerConfig::new("api")
            .with_patterns(vec![email()])
            .with_patterns_url(url(&server)),
    );

    assert!(logger.refresh_patterns().await.is_err());
    assert_eq!(logger.active_pattern_count(), 1);

    logger.info("Contact support@example.com", None);
    assert_eq!(
        sink.entries().last().unwrap()["message"],
        "Contact [REDACTED-EMAIL]"
    );
}

#[tokio::test]
async fn test_refresh_without_url() {
    let (logger, _sink) = logger(LoggerConfig::new("api"));
    assert!(matches!(
        logger.refresh_patterns().await,
        Err(LoggerError::NoPatternSource)
    ));

    let uninitialized = Logger::new();
    assert!(matches!(
        uninitialized.refresh_patterns().await,
        Err(LoggerError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_initialize_fetches_in_background() {
    let server = serve(ResponseTemplate::new(200).set_body_json(remote_patterns())).await;
    let (logger, _sink) = logger(LoggerConfig::new("api").with_patterns_url(url(&server)));

    // Baseline is empty until the background fetch lands
    for _ in 0..100 {
        if logger.active_pattern_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(logger.active_pattern_count(), 2);
}

#[tokio::test]
async fn test_end_to_end_email_redaction() {
    let (logger, sink) = logger(LoggerConfig::new("api").with_patterns(vec![email()]));

    logger.info("Contact support@example.com", None);

    let line = sink.lines().pop().unwrap();
    assert!(!line.contains("support@example.com"));
    let entry: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(entry["message"], "Contact [REDACTED-EMAIL]");
}

#[tokio::test]
async fn test_task_scoped_correlation_ids() {
    let (logger, sink) = logger(
        LoggerConfig::new("api").with_environment(RuntimeEnvironment::Server),
    );
    let a = CorrelationId::generate();
    let b = CorrelationId::generate();

    tokio::join!(
        logger.with_correlation_id(a.clone(), async {
            tokio::task::yield_now().await;
            logger.info("request a", None);
        }),
        logger.with_correlation_id(b.clone(), async {
            tokio::task::yield_now().await;
            logger.info("request b", None);
        }),
    );
    logger.info("outside", None);

    let entries = sink.entries();
    let find = |msg: &str| entries.iter().find(|e| e["message"] == msg).unwrap().clone();
    assert_eq!(find("request a")["correlationId"], a.as_str());
    assert_eq!(find("request b")["correlationId"], b.as_str());
    assert!(find("outside").get("correlationId").is_none());
}

#[tokio::test]
async fn test_session_scoped_correlation_restores_previous() {
    let (logger, sink) = logger(
        LoggerConfig::new("api").with_environment(RuntimeEnvironment::Browser),
    );
    let outer = CorrelationId::generate();
    let inner = CorrelationId::generate();

    logger.set_correlation_id(outer.clone());
    logger
        .with_correlation_id(inner.clone(), async {
            logger.info("inner", None);
        })
        .await;
    logger.info("after", None);

    let entries = sink.entries();
    assert_eq!(entries[0]["correlationId"], inner.as_str());
    assert_eq!(entries[1]["correlationId"], outer.as_str());
}
