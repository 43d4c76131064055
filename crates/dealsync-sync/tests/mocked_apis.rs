use std::collections::HashMap;

use dealsync_sync::{build_pipeline, run_sync, RunMode, SyncConfig, SyncSettings};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> SyncConfig {
    let env: HashMap<&str, String> = HashMap::from([
        ("HUBSPOT_API_KEY", "hs-key".to_string()),
        ("NOTION_TOKEN", "notion-secret".to_string()),
        ("NOTION_PROJECT_DB", "db1".to_string()),
        ("HUBSPOT_PORTAL_ID", "42".to_string()),
        ("HUBSPOT_API_BASE", server.uri()),
        ("NOTION_API_BASE", server.uri()),
    ]);
    let settings = SyncSettings {
        deal_properties: vec!["dealname".into(), "amount".into()],
        ..SyncSettings::default()
    };
    SyncConfig::from_lookup(settings, |key: &str| env.get(key).cloned()).unwrap()
}

async fn mount_reads(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/deals"))
        .and(header("authorization", "Bearer hs-key"))
        .and(query_param("properties", "dealname,amount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": "1", "properties": {"dealname": "Alpha", "amount": "100", "hs_object_id": "1"}},
                {"id": "2", "properties": {"dealname": "Beta", "amount": null}}
            ]
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/databases/db1"))
        .and(header("authorization", "Bearer notion-secret"))
        .and(header("Notion-Version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "database",
            "id": "db1",
            "properties": {
                "Name": {"id": "title", "name": "Name", "type": "title", "title": {}},
                "HubSpot": {"id": "u", "name": "HubSpot", "type": "url", "url": {}},
                "amount": {"id": "a", "name": "amount", "type": "rich_text", "rich_text": {}}
            }
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/databases/db1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "object": "page",
                "id": "r1",
                "archived": false,
                "properties": {
                    "Name": {"id": "title", "type": "title", "title": [{"plain_text": "Old name"}]},
                    "HubSpot": {"id": "u", "type": "url", "url": "https://app.hubspot.com/contacts/42/deal/1"}
                }
            }],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn syncs_hubspot_deals_into_notion() {
    let server = MockServer::start().await;
    mount_reads(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/pages/r1"))
        .and(body_partial_json(json!({"properties": {
            "Name": {"title": [{"type": "text", "text": {"content": "Alpha"}}]},
            "amount": {"rich_text": [{"type": "text", "text": {"content": "100"}}]}
        }})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "page", "id": "r1"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_partial_json(json!({
            "parent": {"database_id": "db1"},
            "properties": {
                "Name": {"title": [{"type": "text", "text": {"content": "Beta"}}]},
                "HubSpot": {"url": "https://app.hubspot.com/contacts/42/deal/2"},
                "amount": {"rich_text": []}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "page", "id": "r2"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/v1/databases/db1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let summary = run_sync(&config_for(&server), &RunMode::default())
        .await
        .unwrap();

    assert_eq!(summary.source, "hubspot");
    assert_eq!(summary.source_records, 2);
    assert!(!summary.schema_updated);
    assert_eq!(summary.updates.written, 1);
    assert_eq!(summary.creates.written, 1);
}

#[tokio::test]
async fn dry_run_sends_no_writes() {
    let server = MockServer::start().await;
    mount_reads(&server).await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let mode = RunMode {
        dry_run: true,
        source_fixture: None,
    };
    let summary = build_pipeline(&config_for(&server), &mode)
        .unwrap()
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.updates.written, 1);
    assert_eq!(summary.creates.written, 1);
    assert_eq!(summary.skipped_writes, 2);
}

#[tokio::test]
async fn notion_rejection_surfaces_as_remote_failure() {
    let server = MockServer::start().await;
    mount_reads(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/pages/r1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "object": "error",
            "status": 400,
            "code": "validation_error",
            "message": "body failed validation"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r2"})))
        .expect(0)
        .mount(&server)
        .await;

    let err = run_sync(&config_for(&server), &RunMode::default())
        .await
        .unwrap_err();
    let rendered = format!("{err:#}");
    assert!(rendered.contains("update_row"), "{rendered}");
    assert!(rendered.contains("400"), "{rendered}");
}

#[tokio::test]
async fn fixture_source_skips_hubspot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/deals"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/databases/db1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {
                "Name": {"type": "title", "title": {}},
                "HubSpot": {"type": "url", "url": {}}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/databases/db1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [], "has_more": false, "next_cursor": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r9"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("deals.json");
    std::fs::write(&fixture, r#"[{"id":"9","fields":{"dealname":"Offline"}}]"#).unwrap();

    let mode = RunMode {
        dry_run: false,
        source_fixture: Some(fixture),
    };
    let summary = run_sync(&config_for(&server), &mode).await.unwrap();
    assert_eq!(summary.source, "fixture");
    assert_eq!(summary.creates.written, 1);
}
