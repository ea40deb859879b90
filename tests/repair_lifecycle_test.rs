mod common;

use axum::http::StatusCode;
use common::{admin, client, provider, setup_test_app, TestApp};
use homeserv::domain::{Clock, EscrowStatus, ServiceStatus};
use serde_json::json;

const HOUR: i64 = 3_600_000;

struct Parties {
    client_id: i64,
    provider_id: i64,
    category_id: i64,
}

async fn parties(app: &TestApp) -> Parties {
    let c = app
        .repo
        .insert_client("Carla", Some("111.222.333-44"))
        .await
        .unwrap();
    let p = app.repo.insert_provider("Ana", "Encanador, Plumbing").await.unwrap();
    let category = app.repair_category().await;
    Parties {
        client_id: c.id,
        provider_id: p.id,
        category_id: category.id,
    }
}

async fn create(app: &TestApp, p: &Parties, sla: &str) -> i64 {
    let (status, body) = app
        .call(
            "POST",
            "/v1/requests",
            client(p.client_id),
            Some(json!({
                "categoryId": p.category_id,
                "title": "Leaking sink",
                "description": "Water pooling under the kitchen sink",
                "slaPriority": sla
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

/// Drive a fresh request to `quote_sent` through the API.
async fn quoted(app: &TestApp, p: &Parties) -> i64 {
    let id = create(app, p, "standard").await;

    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/diagnose", id),
            client(p.client_id),
            Some(json!({"description": "Water pooling under the kitchen sink"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, fee) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/diagnosis-fee", id),
            client(p.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .call(
            "POST",
            "/v1/payments/confirm",
            None,
            Some(json!({"paymentRef": fee["paymentRef"]})),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.wait_for_status(id, ServiceStatus::FeePaid).await;

    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/assign", id),
            client(p.client_id),
            Some(json!({"providerId": p.provider_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/provider-diagnosis", id),
            provider(p.provider_id),
            Some(json!({
                "findings": "Worn siphon and loose coupling",
                "laborCost": 15000,
                "materialsCost": 5000
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/quote", id),
            provider(p.provider_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "quote_sent");
    id
}

#[tokio::test]
async fn test_sla_scales_displayed_estimate() {
    let app = setup_test_app().await;
    let p = parties(&app).await;

    let standard = create(&app, &p, "standard").await;
    let urgent = create(&app, &p, "urgent").await;

    let (_, body) = app
        .call("GET", &format!("/v1/requests/{}", standard), client(p.client_id), None)
        .await;
    assert_eq!(body["request"]["estimatedPrice"].as_f64(), Some(15000.0));
    assert_eq!(body["request"]["status"], "pending");

    let (_, body) = app
        .call("GET", &format!("/v1/requests/{}", urgent), client(p.client_id), None)
        .await;
    assert_eq!(body["request"]["estimatedPrice"].as_f64(), Some(30000.0));
}

#[tokio::test]
async fn test_full_repair_lifecycle() {
    let app = setup_test_app().await;
    let p = parties(&app).await;
    let id = quoted(&app, &p).await;

    let (status, receipt) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/accept", id),
            client(p.client_id),
            Some(json!({"method": "card", "originAddress": "203.0.113.9"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", receipt);
    assert_eq!(receipt["request"]["status"], "accepted");
    assert_eq!(receipt["acceptance"]["platformFee"].as_f64(), Some(2000.0));
    assert_eq!(receipt["acceptance"]["totalPrice"].as_f64(), Some(22000.0));
    assert_eq!(receipt["acceptance"]["originAddress"], "203.0.113.9");
    assert_eq!(receipt["escrow"]["holdAmount"].as_f64(), Some(22000.0));
    assert_eq!(receipt["escrow"]["status"], "holding");
    assert_eq!(receipt["payment"]["status"], "pending");

    // The provider waits for the service payment to clear.
    let start = format!("/v1/requests/{}/start", id);
    let (status, _) = app.call("POST", &start, provider(p.provider_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    app.confirm_payment(receipt["payment"]["paymentRef"].as_str().unwrap())
        .await;
    assert_eq!(app.status_of(id).await, ServiceStatus::Accepted);

    let (status, _) = app.call("POST", &start, provider(p.provider_id), None).await;
    assert_eq!(status, StatusCode::OK);

    app.clock.advance_minutes(60);
    let (status, report) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/complete", id),
            provider(p.provider_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["execution"]["durationMinutes"], 60);
    assert_eq!(report["flags"].as_array().unwrap().len(), 0);

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/confirm", id),
            client(p.client_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let escrow = app.repo.get_escrow_for_request(id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);
    assert!(escrow.released_at.is_some());

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/review", id),
            client(p.client_id),
            Some(json!({"providerId": p.provider_id, "rating": 9, "comment": "Quick and tidy"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["reputation"]["totalRatings"], 1);
    assert_eq!(body["reputation"]["rating"].as_f64(), Some(9.0));

    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/review", id),
            client(p.client_id),
            Some(json!({"providerId": p.provider_id, "rating": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_short_execution_flagged_once() {
    let app = setup_test_app().await;
    let p = parties(&app).await;
    let id = quoted(&app, &p).await;

    let (_, receipt) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/accept", id),
            client(p.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    app.confirm_payment(receipt["payment"]["paymentRef"].as_str().unwrap())
        .await;

    // Device timestamps claiming a two hour job are ignored.
    let claimed_start = app.clock.now().as_ms() - 2 * HOUR;
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/start", id),
            provider(p.provider_id),
            Some(json!({"at": claimed_start})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.clock.advance_minutes(20);
    let (status, report) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/complete", id),
            provider(p.provider_id),
            Some(json!({"at": claimed_start + 2 * HOUR})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["request"]["status"], "awaiting_confirmation");
    assert_eq!(report["execution"]["durationMinutes"], 20);
    let flags = report["flags"].as_array().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0]["reason"], "short_execution_duration");
    assert_eq!(flags[0]["severity"], "medium");

    let (_, pending) = app.call("GET", "/v1/admin/flags", admin(1), None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_wrong_party_and_wrong_status() {
    let app = setup_test_app().await;
    let p = parties(&app).await;
    let id = create(&app, &p, "express").await;

    // No identity.
    let (status, _) = app
        .call("POST", &format!("/v1/requests/{}/cancel", id), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Another client.
    let other = app.repo.insert_client("Otto", None).await.unwrap();
    let (status, _) = app
        .call("POST", &format!("/v1/requests/{}/cancel", id), client(other.id), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No provider is attached yet, so none may quote.
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/quote", id),
            provider(p.provider_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Accept before any quote.
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/accept", id),
            client(p.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call("POST", &format!("/v1/requests/{}/cancel", id), client(p.client_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = app
        .call("GET", "/v1/requests/9999", client(p.client_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_provider_list_bands_and_assignment() {
    let app = setup_test_app().await;
    let p = parties(&app).await;
    app.repo.insert_provider("Eletro", "Electrician").await.unwrap();
    let id = create(&app, &p, "standard").await;

    app.call(
        "POST",
        &format!("/v1/requests/{}/diagnose", id),
        client(p.client_id),
        None,
    )
    .await;
    let (_, fee) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/diagnosis-fee", id),
            client(p.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    assert_eq!(fee["amount"].as_f64(), Some(3000.0));

    // Asking again returns the same pending payment.
    let (_, again) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/diagnosis-fee", id),
            client(p.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    assert_eq!(again["id"], fee["id"]);

    app.call(
        "POST",
        "/v1/payments/confirm",
        None,
        Some(json!({"paymentRef": fee["paymentRef"]})),
    )
    .await;
    app.wait_for_status(id, ServiceStatus::FeePaid).await;

    let (status, candidates) = app
        .call(
            "GET",
            &format!("/v1/requests/{}/providers", id),
            client(p.client_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let candidates = candidates.as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["id"], p.provider_id);
    assert_eq!(candidates[0]["band"]["tier"], "new");
    assert_eq!(candidates[0]["band"]["bandMin"].as_f64(), Some(10000.0));
    assert_eq!(candidates[0]["band"]["bandMax"].as_f64(), Some(11000.0));

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/assign", id),
            client(p.client_id),
            Some(json!({"providerId": p.provider_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "provider_assigned");
    assert_eq!(body["estimatedPrice"].as_f64(), Some(10500.0));

    // Once assigned, a different provider cannot submit findings.
    let intruder = app.repo.insert_provider("Bia", "Plumbing").await.unwrap();
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/provider-diagnosis", id),
            provider(intruder.id),
            Some(json!({"findings": "x", "laborCost": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_concurrent_accepts_have_one_winner() {
    let app = setup_test_app().await;
    let p = parties(&app).await;
    let id = quoted(&app, &p).await;

    let uri = format!("/v1/requests/{}/accept", id);
    let (a, b) = tokio::join!(
        app.call("POST", &uri, client(p.client_id), Some(json!({"method": "pix"}))),
        app.call("POST", &uri, client(p.client_id), Some(json!({"method": "card"}))),
    );
    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    let payments = app.repo.list_payments(id).await.unwrap();
    // Diagnosis fee plus a single service payment.
    assert_eq!(payments.len(), 2);
    assert!(app.repo.get_acceptance(id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_payment_cannot_be_confirmed() {
    let app = setup_test_app().await;
    let p = parties(&app).await;
    let id = create(&app, &p, "standard").await;
    app.call(
        "POST",
        &format!("/v1/requests/{}/diagnose", id),
        client(p.client_id),
        None,
    )
    .await;
    let (_, fee) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/diagnosis-fee", id),
            client(p.client_id),
            Some(json!({"method": "boleto"})),
        )
        .await;

    let (status, failed) = app
        .call(
            "POST",
            "/v1/payments/fail",
            None,
            Some(json!({"paymentRef": fee["paymentRef"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(failed["status"], "failed");

    let payment_ref = fee["paymentRef"].as_str().unwrap();
    assert!(app.lifecycle.on_payment_confirmed(payment_ref).await.is_err());
    assert_eq!(app.status_of(id).await, ServiceStatus::AiDiagnosed);
}

#[tokio::test]
async fn test_fee_confirmed_after_cancel_is_kept() {
    let app = setup_test_app().await;
    let p = parties(&app).await;
    let id = create(&app, &p, "standard").await;
    app.call(
        "POST",
        &format!("/v1/requests/{}/diagnose", id),
        client(p.client_id),
        None,
    )
    .await;
    let (_, fee) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/diagnosis-fee", id),
            client(p.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    let (status, _) = app
        .call("POST", &format!("/v1/requests/{}/cancel", id), client(p.client_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    app.confirm_payment(fee["paymentRef"].as_str().unwrap()).await;
    assert_eq!(app.status_of(id).await, ServiceStatus::Cancelled);

    let (_, view) = app
        .call("GET", &format!("/v1/requests/{}", id), client(p.client_id), None)
        .await;
    assert_eq!(view["payments"][0]["status"], "completed");
}
