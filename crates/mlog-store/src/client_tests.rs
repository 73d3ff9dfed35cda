//! Wiremock-backed tests for the store client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mlog_models::fields;

use crate::auth::{BoxFuture, TokenSource};
use crate::client::{StoreClient, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::retry::RetryConfig;

/// Token source handing out `tok-1`, `tok-2`, ... on successive fetches.
struct SequenceTokenSource {
    fetches: AtomicUsize,
}

impl SequenceTokenSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fetches: AtomicUsize::new(0),
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TokenSource for SequenceTokenSource {
    fn fetch_token(&self) -> BoxFuture<'_, StoreResult<String>> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Ok(format!("tok-{}", n)) })
    }
}

fn test_client(server: &MockServer) -> (StoreClient, Arc<SequenceTokenSource>) {
    let source = SequenceTokenSource::new();
    let config = StoreConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        token_refresh: Duration::from_secs(60),
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
    };
    let client = StoreClient::new(config, source.clone()).unwrap();
    (client, source)
}

fn footage_record(id: &str, status: &str, record_id: &str) -> serde_json::Value {
    json!({
        "fieldData": {
            "INFO_FTG_ID": id,
            "AutoLog_Status": status,
        },
        "recordId": record_id,
        "modId": "1"
    })
}

#[tokio::test]
async fn find_by_field_returns_records() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": [footage_record("AF0001", "0 - Pending File Info", "11")]}
        })))
        .mount(&server)
        .await;

    let records = client
        .find_by_field(
            fields::FOOTAGE_LAYOUT,
            fields::footage::STATUS,
            "0 - Pending File Info",
            500,
            10_000,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_key, "11");
    assert_eq!(records[0].fields[fields::footage::ID], json!("AF0001"));
}

/// When a status holds exactly `page_size` records, discovery issues exactly
/// two requests: the second page comes back empty and iteration stops.
#[tokio::test]
async fn pagination_full_page_issues_exactly_two_requests() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    // First page: no offset field, full page.
    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .and(body_json(json!({
            "query": [{"AutoLog_Status": "1 - File Info Complete"}],
            "limit": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": [
                footage_record("AF0001", "1 - File Info Complete", "1"),
                footage_record("AF0002", "1 - File Info Complete", "2"),
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Second page: offset advanced by the records already returned.
    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .and(body_json(json!({
            "query": [{"AutoLog_Status": "1 - File Info Complete"}],
            "limit": 2,
            "offset": 2
        })))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let records = client
        .find_by_field(
            fields::FOOTAGE_LAYOUT,
            fields::footage::STATUS,
            "1 - File Info Complete",
            2,
            10_000,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    server.verify().await;
}

#[tokio::test]
async fn find_treats_no_records_as_empty() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    // No mock mounted: wiremock answers 404, the store's "no records" signal.
    let records = client
        .find_by_field(
            fields::FOOTAGE_LAYOUT,
            fields::footage::STATUS,
            "9 - Complete",
            500,
            10_000,
        )
        .await
        .unwrap();

    assert!(records.is_empty());
}

#[tokio::test]
async fn unauthorized_triggers_one_reauth_and_retry() {
    let server = MockServer::start().await;
    let (client, source) = test_client(&server);

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": [footage_record("AF0001", "0 - Pending File Info", "11")]}
        })))
        .mount(&server)
        .await;

    let records = client
        .find_by_field(
            fields::FOOTAGE_LAYOUT,
            fields::footage::STATUS,
            "0 - Pending File Info",
            500,
            10_000,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn transient_server_error_is_retried() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": [footage_record("AF0003", "2 - Thumbnails Complete", "3")]}
        })))
        .mount(&server)
        .await;

    let records = client
        .find_by_field(
            fields::FOOTAGE_LAYOUT,
            fields::footage::STATUS,
            "2 - Thumbnails Complete",
            500,
            10_000,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn rate_limit_honors_server_delay_and_retries() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": []}
        })))
        .mount(&server)
        .await;

    let records = client
        .find_by_field(
            fields::FOOTAGE_LAYOUT,
            fields::footage::STATUS,
            "3 - Creating Frames",
            500,
            10_000,
        )
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn or_find_builds_one_predicate_per_id_with_buffer() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    Mock::given(method("POST"))
        .and(path("/layouts/FOOTAGE/_find"))
        .and(body_json(json!({
            "query": [
                {"INFO_FTG_ID": "AF0001"},
                {"INFO_FTG_ID": "AF0002"},
            ],
            "limit": 12
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": [
                footage_record("AF0001", "5 - Processing Frame Info", "1"),
                footage_record("AF0002", "9 - Complete", "2"),
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = client
        .find_by_or(
            fields::FOOTAGE_LAYOUT,
            fields::footage::ID,
            &["AF0001", "AF0002"],
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    server.verify().await;
}

#[tokio::test]
async fn or_find_with_no_ids_skips_the_network() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    let records = client
        .find_by_or(fields::FOOTAGE_LAYOUT, fields::footage::ID, &[])
        .await
        .unwrap();

    assert!(records.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn get_one_fetches_by_record_key() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    Mock::given(method("GET"))
        .and(path("/layouts/FOOTAGE/records/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": [footage_record("AF0042", "4 - Scraping URL", "42")]}
        })))
        .mount(&server)
        .await;

    let record = client.get_one(fields::FOOTAGE_LAYOUT, "42").await.unwrap();
    assert_eq!(record.record_key, "42");
    assert_eq!(record.fields[fields::footage::STATUS], json!("4 - Scraping URL"));
}

#[tokio::test]
async fn get_one_missing_record_is_an_error() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    let result = client.get_one(fields::FOOTAGE_LAYOUT, "999").await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn patch_fields_sends_field_data_envelope() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    Mock::given(method("PATCH"))
        .and(path("/layouts/FRAMES/records/7"))
        .and(body_json(json!({
            "fieldData": {"FRAMES_Status": "2 - Thumbnail Complete"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let mut field_data = serde_json::Map::new();
    field_data.insert(
        fields::frame::STATUS.to_string(),
        json!("2 - Thumbnail Complete"),
    );
    client
        .patch_fields(fields::FRAMES_LAYOUT, "7", field_data)
        .await
        .unwrap();

    server.verify().await;
}

#[tokio::test]
async fn get_children_of_queries_the_parent_field() {
    let server = MockServer::start().await;
    let (client, _) = test_client(&server);

    Mock::given(method("POST"))
        .and(path("/layouts/FRAMES/_find"))
        .and(body_partial_json(json!({
            "query": [{"FRAMES_ParentID": "AF0042"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"data": [
                {
                    "fieldData": {
                        "FRAMES_ID": "AF0042_001",
                        "FRAMES_ParentID": "AF0042",
                        "FRAMES_Status": "1 - Pending Thumbnail",
                    },
                    "recordId": "70",
                    "modId": "0"
                }
            ]}
        })))
        .mount(&server)
        .await;

    let children = client.get_children_of("AF0042", 1000).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].fields[fields::frame::ID], json!("AF0042_001"));
}
