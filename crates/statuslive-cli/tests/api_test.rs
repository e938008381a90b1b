//! REST client against an HTTP double.

use serde_json::json;
use statuslive_cli::{ApiClient, ApiError, IncidentStatus, ServiceStatus};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

fn service(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "organization_id": "org-1",
        "name": format!("service {id}"),
        "description": "",
        "status": status,
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:00Z"
    })
}

async fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&format!("{}/api", server.uri()), Some("t0ken".into()), Some("org-1".into()))
        .unwrap()
}

#[tokio::test]
async fn lists_send_bearer_and_organization_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/services"))
        .and(header("authorization", "Bearer t0ken"))
        .and(header("x-organization-id", "org-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [service("s1", "operational"), service("s2", "partial_outage")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let services = client(&server).await.services().await.unwrap();

    assert_eq!(services.len(), 2);
    assert_eq!(services[1].status, ServiceStatus::PartialOutage);
}

#[tokio::test]
async fn missing_or_null_envelope_key_reads_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/incidents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "incidents": null })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let api = client(&server).await;
    assert!(api.incidents().await.unwrap().is_empty());
    assert!(api.organizations().await.unwrap().is_empty());
}

#[tokio::test]
async fn public_status_is_unauthenticated_and_decodes_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/status/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organization": { "id": "org-1", "name": "Acme", "slug": "acme" },
            "services": [service("s1", "major_outage")],
            "incidents": [{
                "id": "i1", "title": "Down", "status": "investigating", "type": "outage"
            }]
        })))
        .mount(&server)
        .await;

    let api = ApiClient::new(&format!("{}/api/", server.uri()), None, None).unwrap();
    let page = api.public_status("acme").await.unwrap();

    assert_eq!(page.organization.name, "Acme");
    assert_eq!(page.services[0].status, ServiceStatus::MajorOutage);
    assert_eq!(page.incidents[0].status, IncidentStatus::Investigating);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.headers.contains_key("authorization")));
}

#[tokio::test]
async fn unknown_slug_is_organization_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/status/nobody"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = client(&server).await.public_status("nobody").await.unwrap_err();
    assert_eq!(err, ApiError::OrganizationNotFound("nobody".into()));
}

#[tokio::test]
async fn error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/services"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client(&server).await.services().await.unwrap_err();
    assert_eq!(err, ApiError::Http { status: 503, body: "maintenance".into() });
}

#[tokio::test]
async fn malformed_body_is_deserialize_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/services"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).await.services().await.unwrap_err();
    assert!(matches!(err, ApiError::Deserialize(_)));
}
