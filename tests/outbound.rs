//! Outbound HTTP behaviour against wiremock doubles: signed webhook
//! delivery and the pinning client.

use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use adparcel_gateway::middleware::verify_signature;
use adparcel_gateway::notification::webhook::{WebhookEvent, WebhookNotifier};
use adparcel_gateway::proxy::pinata::PinataClient;

#[tokio::test]
async fn webhook_delivery_is_signed_and_verifiable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header_exists("x-adparcel-signature"))
        .and(header_exists("x-adparcel-delivery-id"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new("shared-secret".into());
    let id = uuid::Uuid::new_v4();
    let event = WebhookEvent::agent_decision(&id, Some(7), "parcel_rented");

    notifier
        .send(&format!("{}/hook", server.uri()), &event)
        .await
        .expect("delivery should succeed on first attempt");

    // The receiver can verify the body with the shared secret.
    let received: Vec<Request> = server.received_requests().await.unwrap();
    let req = &received[0];
    let signature = req.headers["x-adparcel-signature"].to_str().unwrap();
    assert!(verify_signature("shared-secret", &req.body, signature));
    assert!(!verify_signature("wrong-secret", &req.body, signature));
}

#[tokio::test]
async fn pin_json_returns_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pinning/pinJSONToIPFS"))
        .and(header_exists("authorization"))
        .and(body_json(serde_json::json!({
            "pinataMetadata": { "name": "website-1" },
            "pinataContent": { "url": "https://example.com" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "IpfsHash": "QmExampleHash",
            "PinSize": 128,
            "Timestamp": "2025-01-01T00:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        PinataClient::new("jwt".into(), server.uri()).with_api_base(&server.uri());
    let hash = client
        .pin_json("website-1", &serde_json::json!({ "url": "https://example.com" }))
        .await
        .unwrap();
    assert_eq!(hash, "QmExampleHash");
}

#[tokio::test]
async fn unpin_tolerates_missing_pin() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/pinning/unpin/QmGone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = PinataClient::new("jwt".into(), server.uri()).with_api_base(&server.uri());
    client.unpin("QmGone").await.expect("404 is not an error");
}

#[tokio::test]
async fn fetch_json_reads_through_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ipfs/QmTraits"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "width": 300, "height": 250 })),
        )
        .mount(&server)
        .await;

    let client = PinataClient::new("jwt".into(), server.uri());
    let traits: adparcel_gateway::models::parcel::ParcelTraits =
        client.fetch_json("QmTraits").await.unwrap();
    assert_eq!(traits.width, 300);
    assert_eq!(traits.height, 250);
}
