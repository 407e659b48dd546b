//! HTTP-level tests for the Slack client against a local mock server.

use serde_json::json;
use slack::models::{FilesParams, HistoryParams};
use slack::{SlackError, SlackOptions, SlackService};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn service(server: &MockServer) -> SlackService {
    SlackService::new(SlackOptions::new("xoxp-test").with_base_url(server.uri()))
}

#[tokio::test]
async fn delete_message_sends_channel_and_ts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.delete"))
        .and(header("authorization", "Bearer xoxp-test"))
        .and(body_string_contains("channel=C1"))
        .and(body_string_contains("ts=100.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    service(&server)
        .await
        .delete_message("C1", "100.1")
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_message_reports_missing_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat.delete"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": false, "error": "message_not_found"})),
        )
        .mount(&server)
        .await;

    let err = service(&server)
        .await
        .delete_message("C1", "100.1")
        .await
        .unwrap_err();
    assert!(err.is_already_gone());
}

#[tokio::test]
async fn too_many_requests_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files.delete"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = service(&server).await.delete_file("F1").await.unwrap_err();
    assert!(matches!(
        err,
        SlackError::RateLimited {
            retry_after: Some(7)
        }
    ));
}

#[tokio::test]
async fn history_passes_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations.history"))
        .and(body_string_contains("cursor=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "messages": [{"type": "message", "user": "U1", "ts": "1.0"}],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let history = service(&server)
        .await
        .conversation_history(&HistoryParams {
            channel: "C1".to_string(),
            cursor: Some("abc".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(history.messages.len(), 1);
    assert!(!history.has_more);
    assert_eq!(history.next_cursor(), None);
}

#[tokio::test]
async fn list_files_filters_by_user_and_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files.list"))
        .and(body_string_contains("user=U1"))
        .and(body_string_contains("channel=C1"))
        .and(body_string_contains("page=2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "files": [{"id": "F9"}],
            "paging": {"count": 1, "total": 2, "page": 2, "pages": 2}
        })))
        .mount(&server)
        .await;

    let files = service(&server)
        .await
        .list_files(&FilesParams {
            user: Some("U1".to_string()),
            channel: Some("C1".to_string()),
            page: 2,
            count: None,
        })
        .await
        .unwrap();

    assert_eq!(files.files[0].id, "F9");
    assert_eq!(files.paging.page, files.paging.pages);
}
