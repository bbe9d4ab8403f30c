//! Contract tests for `HttpAuthorityClient` against a mocked dataspace authority.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/api/v1/credentials` | `request_credential_*` |

use chrono::Utc;
use dsreg_client::{ClientConfig, HttpAuthorityClient};
use dsreg_core::{FailureKind, IdentityAssertion, ParticipantDid, RegistrationId};
use dsreg_engine::AuthorityClient;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer) -> HttpAuthorityClient {
    let config = ClientConfig::new("http://127.0.0.1:19000", &mock_server.uri(), "test-token")
        .unwrap();
    HttpAuthorityClient::new(&config).unwrap()
}

fn registration() -> RegistrationId {
    RegistrationId::from(uuid::Uuid::from_u128(0x5eed_0000_0000_4000_8000_0000_0000_0042))
}

fn assertion() -> IdentityAssertion {
    let mut assertion =
        IdentityAssertion::new(ParticipantDid::new("did:example:alice").unwrap(), Utc::now());
    assertion.verification_methods = vec!["did:example:alice#key-1".into()];
    assertion
}

async fn mount(mock_server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/v1/credentials"))
        .respond_with(response)
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn request_credential_sends_bearer_and_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/credentials"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("idempotency-key", registration().as_uuid().to_string().as_str()))
        .and(body_partial_json(serde_json::json!({
            "registrationId": registration().as_uuid().to_string(),
            "participantDid": "did:example:alice",
            "verificationMethods": ["did:example:alice#key-1"]
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({"credentialId": "urn:uuid:membership-42"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let credential = test_client(&mock_server)
        .request_credential(registration(), &assertion())
        .await
        .unwrap();
    assert_eq!(credential.as_str(), "urn:uuid:membership-42");
}

#[tokio::test]
async fn request_credential_forbidden_is_policy_rejection() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        ResponseTemplate::new(403).set_body_string("membership policy not satisfied"),
    )
    .await;

    let failure = test_client(&mock_server)
        .request_credential(registration(), &assertion())
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Permanent);
    assert_eq!(failure.reason, "policy rejection: membership policy not satisfied");
}

#[tokio::test]
async fn request_credential_unprocessable_is_permanent() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, ResponseTemplate::new(422)).await;

    let failure = test_client(&mock_server)
        .request_credential(registration(), &assertion())
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Permanent);
    assert!(failure.reason.starts_with("policy rejection"));
}

#[tokio::test]
async fn request_credential_unauthorized_is_permanent() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, ResponseTemplate::new(401)).await;

    let failure = test_client(&mock_server)
        .request_credential(registration(), &assertion())
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Permanent);
}

#[tokio::test]
async fn request_credential_unavailable_is_transient() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, ResponseTemplate::new(503)).await;

    let failure = test_client(&mock_server)
        .request_credential(registration(), &assertion())
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Transient);
}

#[tokio::test]
async fn request_credential_missing_id_is_permanent() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "issued"})),
    )
    .await;

    let failure = test_client(&mock_server)
        .request_credential(registration(), &assertion())
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Permanent);
}
