mod common;

use axum::http::StatusCode;
use common::{client, provider, setup_test_app, TestApp};
use homeserv::domain::{CategoryKind, ServiceStatus};
use homeserv::Decimal;
use serde_json::{json, Value};

struct Booking {
    client_id: i64,
    provider_id: i64,
    request_id: i64,
    body: Value,
}

async fn book(app: &TestApp) -> Booking {
    let c = app.repo.insert_client("Carla", None).await.unwrap();
    let p = app
        .repo
        .insert_provider("Dora", "Limpeza residencial")
        .await
        .unwrap();
    let category = app
        .repo
        .insert_category("Limpeza", Decimal::from_units(12000), CategoryKind::Domestic)
        .await
        .unwrap();

    let (status, body) = app
        .call(
            "POST",
            "/v1/domestic/requests",
            client(c.id),
            Some(json!({
                "categoryId": category.id,
                "providerId": p.id,
                "houseSize": "three_to_four_bedrooms",
                "serviceType": "complete",
                "frequency": "weekly"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    Booking {
        client_id: c.id,
        provider_id: p.id,
        request_id: body["request"]["id"].as_i64().unwrap(),
        body,
    }
}

#[tokio::test]
async fn test_quote_without_booking() {
    let app = setup_test_app().await;
    let (status, quote) = app
        .call(
            "POST",
            "/v1/domestic/quote",
            None,
            Some(json!({
                "houseSize": "three_to_four_bedrooms",
                "serviceType": "complete",
                "frequency": "weekly"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["basePrice"].as_f64(), Some(20000.0));
    assert_eq!(quote["finalPrice"].as_f64(), Some(25500.0));
    assert_eq!(quote["platformFee"].as_f64(), Some(3825.0));
}

#[tokio::test]
async fn test_domestic_fast_path_to_accepted() {
    let app = setup_test_app().await;
    let b = book(&app).await;

    assert_eq!(b.body["request"]["status"], "ai_diagnosed");
    assert_eq!(b.body["request"]["providerId"], b.provider_id);
    assert_eq!(b.body["quote"]["finalPrice"].as_f64(), Some(25500.0));

    let (status, view) = app
        .call(
            "GET",
            &format!("/v1/requests/{}", b.request_id),
            client(b.client_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["aiDiagnosis"]["diagnosisFee"].as_f64(), Some(3825.0));
    assert_eq!(view["aiDiagnosis"]["priceRangeMin"], view["aiDiagnosis"]["priceRangeMax"]);
    assert_eq!(view["domestic"]["details"]["frequency"], "weekly");

    let (status, payment) = app
        .call(
            "POST",
            &format!("/v1/domestic/requests/{}/pay", b.request_id),
            client(b.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["kind"], "service");
    assert_eq!(payment["amount"].as_f64(), Some(25500.0));

    // Replayed webhook.
    for _ in 0..2 {
        let (status, _) = app
            .call(
                "POST",
                "/v1/payments/confirm",
                None,
                Some(json!({"paymentRef": payment["paymentRef"]})),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    app.wait_for_status(b.request_id, ServiceStatus::Accepted).await;

    let escrow = app
        .repo
        .get_escrow_for_request(b.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(escrow.shares.hold_amount(), Decimal::from_units(25500));
    assert_eq!(escrow.shares.platform_share(), Decimal::from_units(3825));
    assert_eq!(escrow.shares.provider_share(), Decimal::from_units(21675));

    let acceptance = app.repo.get_acceptance(b.request_id).await.unwrap().unwrap();
    assert_eq!(acceptance.breakdown.total_price, Decimal::from_units(25500));

    // The booked provider runs the job like any other.
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/start", b.request_id),
            provider(b.provider_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_domestic_booking_rules() {
    let app = setup_test_app().await;
    let b = book(&app).await;

    // Repair categories cannot be booked on the fast path.
    let repair = app.repair_category().await;
    let (status, _) = app
        .call(
            "POST",
            "/v1/domestic/requests",
            client(b.client_id),
            Some(json!({
                "categoryId": repair.id,
                "providerId": b.provider_id,
                "houseSize": "one_bedroom",
                "serviceType": "standard",
                "frequency": "one_off"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Domestic requests have no provider quote to accept.
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/requests/{}/accept", b.request_id),
            client(b.client_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Only the owner pays.
    let (status, _) = app
        .call(
            "POST",
            &format!("/v1/domestic/requests/{}/pay", b.request_id),
            provider(b.provider_id),
            Some(json!({"method": "pix"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
