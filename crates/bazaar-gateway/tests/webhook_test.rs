//! Payment reconciliation through the webhook endpoint.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use rust_decimal::Decimal;

use common::{body_json, checkout_body, get_request, harness, json_request, Harness};
use bazaar_gateway::payments::webhook::sign_payload;

async fn create_booking(h: &Harness, product: &bazaar_core::catalog::Product) -> String {
    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            checkout_body(product, 1),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["booking_id"]
        .as_str()
        .unwrap()
        .to_string()
}

fn completed_event(booking_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_evt",
                "payment_intent": "pi_test_123",
                "metadata": { "booking_id": booking_id }
            }
        }
    }))
    .unwrap()
}

fn signed_webhook(h: &Harness, payload: Vec<u8>) -> Request<Body> {
    let signature = sign_payload(&payload, &h.config.stripe_webhook_secret, Utc::now());
    Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload))
        .unwrap()
}

#[tokio::test]
async fn completed_session_marks_the_booking_paid() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 3).await;
    let booking_id = create_booking(&h, &product).await;

    let response = h.send(signed_webhook(&h, completed_event(&booking_id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "success");

    let response = h
        .send(get_request(
            &format!("/api/payments/bookings/{booking_id}"),
            "acme",
        ))
        .await;
    let booking = body_json(response).await;
    assert_eq!(booking["status"], "PAID");
    assert_eq!(booking["payment_intent_id"], "pi_test_123");
    assert!(!booking["paid_at"].is_null());
}

#[tokio::test]
async fn payment_decrements_stock_for_later_checkouts() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 2).await;
    let booking_id = create_booking(&h, &product).await;

    h.send(signed_webhook(&h, completed_event(&booking_id))).await;

    // One unit sold and gone; only one remains for the next buyer.
    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            checkout_body(&product, 2),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            checkout_body(&product, 1),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn replayed_event_changes_nothing() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 5).await;
    let booking_id = create_booking(&h, &product).await;

    let first = h.send(signed_webhook(&h, completed_event(&booking_id))).await;
    assert_eq!(first.status(), StatusCode::OK);

    let response = h
        .send(get_request(
            &format!("/api/payments/bookings/{booking_id}"),
            "acme",
        ))
        .await;
    let paid_at = body_json(response).await["paid_at"].clone();

    let second = h.send(signed_webhook(&h, completed_event(&booking_id))).await;
    assert_eq!(second.status(), StatusCode::OK);

    let response = h
        .send(get_request(
            &format!("/api/payments/bookings/{booking_id}"),
            "acme",
        ))
        .await;
    let booking = body_json(response).await;
    assert_eq!(booking["status"], "PAID");
    assert_eq!(booking["paid_at"], paid_at);
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_mutation() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 5).await;
    let booking_id = create_booking(&h, &product).await;

    let payload = completed_event(&booking_id);
    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", "t=0,v1=deadbeef")
        .body(Body::from(payload))
        .unwrap();
    let response = h.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .send(get_request(
            &format!("/api/payments/bookings/{booking_id}"),
            "acme",
        ))
        .await;
    assert_eq!(body_json(response).await["status"], "UNPAID");
}

#[tokio::test]
async fn event_without_booking_id_is_acknowledged_and_dropped() {
    let h = harness();
    let payload = serde_json::to_vec(&serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_orphan", "metadata": {} } }
    }))
    .unwrap();

    let response = h.send(signed_webhook(&h, payload)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "success");
}

#[tokio::test]
async fn unknown_booking_is_acknowledged_and_dropped() {
    let h = harness();
    let payload = completed_event(&uuid::Uuid::now_v7().to_string());
    let response = h.send(signed_webhook(&h, payload)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn failed_intent_matching_no_booking_is_a_noop() {
    let h = harness();
    let payload = serde_json::to_vec(&serde_json::json!({
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": "pi_unmatched" } }
    }))
    .unwrap();
    let response = h.send(signed_webhook(&h, payload)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn failure_after_payment_does_not_regress_the_booking() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 5).await;
    let booking_id = create_booking(&h, &product).await;

    h.send(signed_webhook(&h, completed_event(&booking_id))).await;

    // A late failure for the same intent arrives out of order.
    let payload = serde_json::to_vec(&serde_json::json!({
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": "pi_test_123" } }
    }))
    .unwrap();
    let response = h.send(signed_webhook(&h, payload)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .send(get_request(
            &format!("/api/payments/bookings/{booking_id}"),
            "acme",
        ))
        .await;
    assert_eq!(body_json(response).await["status"], "PAID");
}

#[tokio::test]
async fn unrecognized_event_types_are_ignored() {
    let h = harness();
    let payload = serde_json::to_vec(&serde_json::json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_whatever" } }
    }))
    .unwrap();
    let response = h.send(signed_webhook(&h, payload)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "success");
}

#[tokio::test]
async fn malformed_payload_is_a_bad_request() {
    let h = harness();
    let payload = b"not json at all".to_vec();
    let response = h.send(signed_webhook(&h, payload)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
