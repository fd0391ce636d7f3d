//! Public catalog browsing and staff catalog management over HTTP.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn public_catalog_hides_withdrawn_medicines() {
    let app = TestApp::new().await;
    let category = app.seed_category("Pain relief").await;
    let visible = app
        .seed_medicine(category.id, "Paracetamol", dec!(3.50), 40)
        .await;
    let withdrawn = app
        .seed_medicine(category.id, "Codeine", dec!(8.00), 5)
        .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/medicines/{}", withdrawn.medicine.id),
            Some(json!({ "is_available": false })),
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request(Method::GET, "/api/v1/medicines", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Paracetamol");
    assert_eq!(items[0]["category_name"], "Pain relief");
    assert_eq!(decimal(&items[0]["price"]), dec!(3.50));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/medicines/{}", withdrawn.medicine.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Staff still see it in the back office
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/admin/medicines/{}", withdrawn.medicine.id),
            None,
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/medicines/{}", visible.medicine.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["is_in_stock"], true);
    assert_eq!(body["data"]["is_low_stock"], false);
}

#[tokio::test]
async fn search_matches_name_and_active_ingredient() {
    let app = TestApp::new().await;
    let pain = app.seed_category("Pain relief").await;
    let allergy = app.seed_category("Allergy").await;
    app.seed_medicine(pain.id, "Ibuprofen", dec!(4.20), 20).await;
    app.seed_medicine(allergy.id, "Cetirizine", dec!(6.10), 20).await;

    let response = app
        .request(Method::GET, "/api/v1/medicines?search=IBU", None, None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Ibuprofen");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/medicines?category_id={}", allergy.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["items"][0]["name"], "Cetirizine");
}

#[tokio::test]
async fn home_features_only_purchasable_medicines() {
    let app = TestApp::new().await;
    let category = app.seed_category("Vitamins").await;
    app.seed_medicine(category.id, "Vitamin C", dec!(5.00), 30).await;
    app.seed_medicine(category.id, "Vitamin D", dec!(7.00), 0).await;

    let response = app.request(Method::GET, "/api/v1/home", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let featured = body["data"]["featured_medicines"].as_array().unwrap();
    assert_eq!(featured.len(), 1);
    assert_eq!(featured[0]["name"], "Vitamin C");
    assert_eq!(body["data"]["categories"][0]["name"], "Vitamins");
}

#[tokio::test]
async fn catalog_changes_require_staff() {
    let app = TestApp::new().await;
    let customer = app.customer("alice").await;
    let payload = json!({ "name": "Skin care" });

    let response = app
        .request(Method::POST, "/api/v1/categories", Some(payload.clone()), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(payload.clone()),
            Some(&customer.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(payload.clone()),
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(payload),
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn creating_medicine_records_opening_stock() {
    let app = TestApp::new().await;
    let category = app.seed_category("Cold and flu").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/medicines",
            Some(json!({
                "name": "Throat lozenges",
                "category_id": category.id,
                "price": "2.99",
                "expiry_date": "2029-06-30",
                "stock_quantity": 25
            })),
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["stock_quantity"], 25);
    assert_eq!(body["data"]["minimum_stock"], 10);
    let medicine_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/inventory/movements?medicine_id={}", medicine_id),
            None,
            Some(&app.staff.token),
        )
        .await;
    let body = response_json(response).await;
    let movements = body["data"]["items"].as_array().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["movement_type"], "in");
    assert_eq!(movements[0]["quantity"], 25);
    assert_eq!(movements[0]["reason"], "Initial stock");
    assert_eq!(movements[0]["username"], app.staff.username.as_str());
}

#[tokio::test]
async fn invalid_prices_are_rejected() {
    let app = TestApp::new().await;
    let category = app.seed_category("First aid").await;

    for price in ["0", "-1.00", "1.999"] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/medicines",
                Some(json!({
                    "name": "Plasters",
                    "category_id": category.id,
                    "price": price,
                    "expiry_date": "2029-06-30"
                })),
                Some(&app.staff.token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "price {price}");
    }
}

#[tokio::test]
async fn categories_and_medicines_with_history_cannot_be_deleted() {
    let app = TestApp::new().await;
    let category = app.seed_category("Digestion").await;
    let medicine = app
        .seed_medicine(category.id, "Antacid", dec!(3.00), 12)
        .await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/categories/{}", category.id),
            None,
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The opening stock movement is history
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/medicines/{}", medicine.medicine.id),
            None,
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let unused = app
        .seed_medicine(category.id, "Probiotic", dec!(9.00), 0)
        .await;
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/medicines/{}", unused.medicine.id),
            None,
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
