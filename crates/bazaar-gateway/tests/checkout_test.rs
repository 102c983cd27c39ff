//! Checkout flow through the full router.

mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;

use common::{body_json, checkout_body, get_request, harness, json_request, refusing_harness};

#[tokio::test]
async fn checkout_returns_the_session_and_persists_the_booking() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 5).await;

    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            checkout_body(&product, 2),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let booking_id = body["booking_id"].as_str().unwrap().to_string();
    assert!(body["checkout_url"].as_str().unwrap().starts_with("https://"));
    assert!(body["session_id"].as_str().unwrap().starts_with("cs_test_"));

    let response = h
        .send(get_request(
            &format!("/api/payments/bookings/{booking_id}"),
            "acme",
        ))
        .await;
    let booking = body_json(response).await;
    assert_eq!(booking["status"], "UNPAID");
    // 2 x 100.00 and flat shipping under the free threshold.
    assert_eq!(booking["subtotal"], "200.00");
    assert_eq!(booking["shipping_cost"], "25.00");
    assert_eq!(booking["total"], "225.00");
    assert_eq!(booking["items"].as_array().unwrap().len(), 1);
    assert_eq!(booking["items"][0]["quantity"], 2);
}

#[tokio::test]
async fn subtotal_at_the_threshold_ships_free() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(25000, 2), 5).await;

    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            checkout_body(&product, 1),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let booking_id = body_json(response).await["booking_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = h
        .send(get_request(
            &format!("/api/payments/bookings/{booking_id}"),
            "acme",
        ))
        .await;
    let booking = body_json(response).await;
    assert_eq!(booking["shipping_cost"], "0");
    assert_eq!(booking["total"], "250.00");
}

#[tokio::test]
async fn empty_cart_is_a_bad_request() {
    let h = harness();
    h.seed_tenant("acme", "acme.example").await;

    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            serde_json::json!({ "items": [], "customer_email": "buyer@example.com" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_request");
}

#[tokio::test]
async fn oversold_quantity_conflicts() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 1).await;

    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            checkout_body(&product, 2),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "insufficient_stock");
}

#[tokio::test]
async fn duplicate_cart_lines_cannot_exceed_stock() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 1).await;

    let body = serde_json::json!({
        "items": [
            { "product_id": product.id.as_uuid(), "quantity": 1 },
            { "product_id": product.id.as_uuid(), "quantity": 1 }
        ],
        "customer_email": "buyer@example.com",
        "customer_name": "Buyer"
    });
    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            body,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "insufficient_stock");
}

#[tokio::test]
async fn concurrent_checkouts_cannot_both_take_the_last_unit() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 1).await;

    let first = h.send(json_request(
        "POST",
        "/api/payments/bookings/create_checkout",
        "acme",
        checkout_body(&product, 1),
    ));
    let second = h.send(json_request(
        "POST",
        "/api/payments/bookings/create_checkout",
        "acme",
        checkout_body(&product, 1),
    ));
    let (first, second) = tokio::join!(first, second);

    let mut statuses = vec![first.status(), second.status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);
}

#[tokio::test]
async fn gateway_refusal_unwinds_the_booking() {
    let h = refusing_harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(10000, 2), 1).await;

    let response = h
        .send(json_request(
            "POST",
            "/api/payments/bookings/create_checkout",
            "acme",
            checkout_body(&product, 1),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "payment_gateway_error");
    // Processor detail never reaches the client.
    assert_eq!(body["error"], "payment processing error");

    // The discarded booking released its reservation.
    let response = h.send(get_request("/api/payments/bookings", "acme")).await;
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn list_filters_by_customer_email() {
    let h = harness();
    let tenant = h.seed_tenant("acme", "acme.example").await;
    let product = h.seed_product(&tenant, Decimal::new(5000, 2), 10).await;

    for email in ["a@example.com", "b@example.com"] {
        let body = serde_json::json!({
            "items": [{ "product_id": product.id.as_uuid(), "quantity": 1 }],
            "customer_email": email,
        });
        let response = h
            .send(json_request(
                "POST",
                "/api/payments/bookings/create_checkout",
                "acme",
                body,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = h
        .send(get_request(
            "/api/payments/bookings?email=a@example.com",
            "acme",
        ))
        .await;
    let bookings = body_json(response).await;
    assert_eq!(bookings.as_array().unwrap().len(), 1);
    assert_eq!(bookings[0]["customer"]["email"], "a@example.com");
}
