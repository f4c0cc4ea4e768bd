//! Integration tests for the DigitalOcean DNS provider against a mocked API

use std::time::Duration;

use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certbeam::acme::dns::{DigitalOceanProvider, DnsProvider, DnsProviderError};

const TOKEN: &str = "dop_v1_test";

fn provider(server: &MockServer) -> DigitalOceanProvider {
    DigitalOceanProvider::with_base_url(TOKEN, &server.uri(), Duration::from_secs(5)).unwrap()
}

async fn mount_domains(server: &MockServer, names: &[&str]) {
    let domains: Vec<_> = names
        .iter()
        .map(|name| serde_json::json!({ "name": name, "ttl": 1800 }))
        .collect();

    Mock::given(method("GET"))
        .and(path("/domains"))
        .and(header("authorization", "Bearer dop_v1_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "domains": domains,
            "links": {},
            "meta": { "total": names.len() }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_txt_record() {
    let server = MockServer::start().await;
    mount_domains(&server, &["example.com"]).await;

    Mock::given(method("POST"))
        .and(path("/domains/example.com/records"))
        .and(header("authorization", "Bearer dop_v1_test"))
        .and(body_json(serde_json::json!({
            "type": "TXT",
            "name": "_acme-challenge.api",
            "data": "challenge-digest",
            "ttl": 30
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "domain_record": {
                "id": 28448433,
                "type": "TXT",
                "name": "_acme-challenge.api",
                "data": "challenge-digest",
                "ttl": 30
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record_id = provider(&server)
        .create_txt_record("api.example.com", "_acme-challenge", "challenge-digest")
        .await
        .unwrap();

    assert_eq!(record_id, "28448433");
}

#[tokio::test]
async fn test_zone_lookup_is_cached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/domains"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "domains": [{ "name": "example.com" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/domains/example.com/records/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let provider = provider(&server);
    provider
        .delete_txt_record("example.com", "7")
        .await
        .unwrap();
    provider
        .delete_txt_record("example.com", "7")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_missing_record_is_ok() {
    let server = MockServer::start().await;
    mount_domains(&server, &["example.com"]).await;

    Mock::given(method("DELETE"))
        .and(path("/domains/example.com/records/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "id": "not_found",
            "message": "The resource you were accessing could not be found."
        })))
        .mount(&server)
        .await;

    provider(&server)
        .delete_txt_record("example.com", "99")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_failure() {
    let server = MockServer::start().await;
    mount_domains(&server, &["example.com"]).await;

    Mock::given(method("DELETE"))
        .and(path("/domains/example.com/records/5"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = provider(&server)
        .delete_txt_record("example.com", "5")
        .await
        .unwrap_err();

    match err {
        DnsProviderError::RecordDeletion { record_id, .. } => assert_eq!(record_id, "5"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_rejected_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/domains"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "id": "Unauthorized",
            "message": "Unable to authenticate you"
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_txt_record("example.com", "_acme-challenge", "digest")
        .await
        .unwrap_err();

    assert!(matches!(err, DnsProviderError::Authentication(_)));
}

#[tokio::test]
async fn test_zone_not_found() {
    let server = MockServer::start().await;
    mount_domains(&server, &["other.org"]).await;

    let err = provider(&server)
        .create_txt_record("example.com", "_acme-challenge", "digest")
        .await
        .unwrap_err();

    match err {
        DnsProviderError::ZoneNotFound { domain } => assert_eq!(domain, "example.com"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_domain_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/domains"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "domains": [{ "name": "example.com" }],
            "links": { "pages": { "prev": format!("{}/domains?page=1", server.uri()) } }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/domains"))
        .and(query_param("per_page", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "domains": [{ "name": "first.org" }],
            "links": { "pages": { "next": format!("{}/domains?page=2", server.uri()) } }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/domains/example.com/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "domain_record": { "id": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record_id = provider(&server)
        .create_txt_record("*.example.com", "_acme-challenge", "digest")
        .await
        .unwrap();

    assert_eq!(record_id, "1");
}
