//! HTTP client tests against a mock NiFi API

use nifi_client::{ClientError, FlowApi, NifiClient};
use nifi_types::*;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEMPLATE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<template encoding-version="1.1">
  <description></description>
  <name>WebCrawler</name>
  <snippet>
    <processGroups>
      <id>5d1a3a7e-0158-1000-0000-000000000000</id>
      <name>WebCrawler</name>
    </processGroups>
  </snippet>
</template>"#;

fn client(server: &MockServer) -> NifiClient {
    NifiClient::new(&format!("{}/nifi-api", server.uri()), Duration::from_secs(5)).unwrap()
}

fn processor_entity(version: u64) -> ProcessorEntity {
    serde_json::from_value(json!({
        "id": "p-1",
        "revision": { "version": version },
        "component": {
            "id": "p-1",
            "name": "FetchPage",
            "state": "STOPPED",
            "config": { "properties": { "Timeout": "30 sec" } }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_stale_revision_maps_to_revision_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/nifi-api/processors/p-1"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            "Error: [3, null, p-1] is not the most up-to-date revision. This component appears to have been modified",
        ))
        .mount(&server)
        .await;

    let update = ProcessorUpdate::state(&processor_entity(2), RunState::Running);
    let err = client(&server).update_processor(&update).await.unwrap_err();
    assert!(err.is_revision_conflict());
}

#[tokio::test]
async fn test_bad_request_with_stale_revision_is_revision_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/nifi-api/processors/p-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            "[1, nifi-deploy, p-1] is not the most up-to-date revision. This component appears to have been modified",
        ))
        .mount(&server)
        .await;

    let update = ProcessorUpdate::state(&processor_entity(1), RunState::Running);
    let err = client(&server).update_processor(&update).await.unwrap_err();
    assert!(err.is_revision_conflict());
    assert!(err.is_retryable());
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_bad_request_without_revision_stays_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/nifi-api/processors/p-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Scheduling Period is invalid"))
        .mount(&server)
        .await;

    let update = ProcessorUpdate::state(&processor_entity(1), RunState::Running);
    let err = client(&server).update_processor(&update).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_state_conflict_is_not_a_revision_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/nifi-api/processors/p-1"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_string("Controller Service is not enabled"),
        )
        .mount(&server)
        .await;

    let update = ProcessorUpdate::state(&processor_entity(2), RunState::Running);
    let err = client(&server).update_processor(&update).await.unwrap_err();
    assert!(matches!(err, ClientError::Conflict { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_update_sends_revision_and_state() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/nifi-api/processors/p-1"))
        .and(body_partial_json(json!({
            "revision": { "version": 4, "clientId": "nifi-deploy" },
            "component": { "id": "p-1", "state": "RUNNING" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p-1",
            "revision": { "version": 5 },
            "component": { "id": "p-1", "name": "FetchPage", "state": "RUNNING" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let update = ProcessorUpdate::state(&processor_entity(4), RunState::Running);
    let updated = client(&server).update_processor(&update).await.unwrap();
    assert_eq!(updated.state(), RunState::Running);
    assert_eq!(updated.revision.version, 5);
}

#[tokio::test]
async fn test_missing_resource_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nifi-api/controller-services/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Unable to find controller service"))
        .mount(&server)
        .await;

    let err = client(&server)
        .controller_service(&ControllerServiceId::new("gone"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_server_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nifi-api/flow/templates"))
        .respond_with(ResponseTemplate::new(503).set_body_string("cluster unavailable"))
        .mount(&server)
        .await;

    let err = client(&server).templates().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_search_passes_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nifi-api/flow/search-results"))
        .and(query_param("q", "WebCrawler"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "searchResultsDTO": {
                "processGroupResults": [
                    { "id": "g-1", "name": "WebCrawler Archive", "groupId": "root-id" },
                    { "id": "g-2", "name": "WebCrawler", "groupId": "root-id" }
                ],
                "processorResults": []
            }
        })))
        .mount(&server)
        .await;

    let hits = client(&server).search_process_groups("WebCrawler").await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[1].id, GroupId::new("g-2"));
}

#[tokio::test]
async fn test_delete_group_passes_revision_in_query() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/nifi-api/process-groups/g-2"))
        .and(query_param("version", "7"))
        .and(query_param("clientId", "nifi-deploy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "g-2" })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .delete_process_group(&GroupId::new("g-2"), &Revision::new(7))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upload_reads_xml_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nifi-api/process-groups/root/templates/upload"))
        .and(header("Accept", "application/xml"))
        .respond_with(ResponseTemplate::new(201).set_body_string(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<templateEntity><template><id>t-42</id><name>WebCrawler</name></template></templateEntity>"#,
        ))
        .mount(&server)
        .await;

    let artifact =
        TemplateArtifact::from_bytes("webcrawler.xml", TEMPLATE_XML.as_bytes().to_vec()).unwrap();
    let summary = client(&server)
        .upload_template(&GroupId::root(), &artifact)
        .await
        .unwrap();
    assert_eq!(summary.id, TemplateId::new("t-42"));
    assert_eq!(summary.name, "WebCrawler");
}

#[tokio::test]
async fn test_duplicate_template_upload_is_a_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nifi-api/process-groups/root/templates/upload"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_string("A template named 'WebCrawler' already exists"),
        )
        .mount(&server)
        .await;

    let artifact =
        TemplateArtifact::from_bytes("webcrawler.xml", TEMPLATE_XML.as_bytes().to_vec()).unwrap();
    let err = client(&server)
        .upload_template(&GroupId::root(), &artifact)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Conflict { .. }));
}

#[tokio::test]
async fn test_instantiate_returns_snippet_root() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/nifi-api/process-groups/root/template-instance"))
        .and(body_partial_json(json!({ "templateId": "t-42" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "flow": {
                "processGroups": [
                    { "id": "g-9", "revision": { "version": 0 },
                      "component": { "id": "g-9", "name": "WebCrawler", "parentGroupId": "root-id" } }
                ]
            }
        })))
        .mount(&server)
        .await;

    let request =
        InstantiateTemplateRequest::new(TemplateId::new("t-42"), Position { x: 10.0, y: 20.0 });
    let flow = client(&server)
        .instantiate_template(&GroupId::root(), &request)
        .await
        .unwrap();
    let group = flow.root_group().unwrap();
    assert_eq!(group.name(), "WebCrawler");
}
