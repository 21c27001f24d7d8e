use reqwest::Method;
use serde_json::json;
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{any, method, path},
};

use crate::helpers::{
    AUDIENCE_ID, spawn_app, spawn_app_with, spawn_app_without_audience, spawn_redirect_app,
};

fn created(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "id": id }))
}

fn contacts_path() -> String {
    format!("/audiences/{AUDIENCE_ID}/contacts")
}

#[tokio::test]
async fn subscribe_returns_200_for_valid_json_body() {
    let app = spawn_app().await;

    Mock::given(path("/emails"))
        .and(method("POST"))
        .respond_with(created("email-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path(contacts_path()))
        .and(method("POST"))
        .respond_with(created("contact-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.post_json(&json!({ "email": "a@b.com" })).await;

    assert_eq!(200, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "success": true,
            "message": "Subscription successful! Check your email for confirmation."
        })
    );
}

#[tokio::test]
async fn subscribe_sends_the_welcome_email_to_the_submitted_address() {
    let app = spawn_app().await;

    Mock::given(path("/emails"))
        .and(method("POST"))
        .respond_with(created("email-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path(contacts_path()))
        .respond_with(created("contact-1"))
        .mount(&app.email_server)
        .await;

    app.post_json(&json!({ "email": "ursula_le_guin@gmail.com" }))
        .await;

    let requests = app.email_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["to"], json!(["ursula_le_guin@gmail.com"]));
    assert_eq!(body["subject"], "Welcome to Cigarette Card Club!");
    assert!(
        body["html"]
            .as_str()
            .unwrap()
            .contains("Welcome to the Cigarette Card Club!")
    );

    let contact: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(contact["email"], "ursula_le_guin@gmail.com");
    assert_eq!(contact["unsubscribed"], false);
}

#[tokio::test]
async fn subscribe_accepts_form_data_too() {
    let app = spawn_app().await;

    Mock::given(path("/emails"))
        .respond_with(created("email-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path(contacts_path()))
        .respond_with(created("contact-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.post_form("email=ursula_le_guin%40gmail.com").await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn subscribe_redirects_to_thank_you_page_under_redirect_style() {
    let app = spawn_redirect_app().await;

    Mock::given(path("/emails"))
        .respond_with(created("email-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path(contacts_path()))
        .respond_with(created("contact-1"))
        .mount(&app.email_server)
        .await;

    let response = app.post_form("email=a%40b.com").await;

    assert_eq!(303, response.status().as_u16());
    assert_eq!(response.headers()["Location"], "/thank-you.html");
    assert!(response.headers().get("Access-Control-Allow-Origin").is_none());
    assert_eq!(response.text().await.unwrap(), "");
}

#[tokio::test]
async fn subscribe_returns_400_for_invalid_emails_without_calling_the_provider() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(created("unexpected"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let test_cases = vec![
        (json!({ "email": "not-an-email" }), "an address without @"),
        (json!({ "email": "" }), "an empty address"),
        (json!({}), "a missing address"),
    ];

    for (body, description) in test_cases {
        let response = app.post_json(&body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not return a 400 Bad Request when the payload was {description}."
        );
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Please provide a valid email address" }));
    }

    let response = app.post_form("name=ursula").await;
    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn subscribe_returns_405_for_other_methods() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(created("unexpected"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let response = app.request(method.clone()).await;

        assert_eq!(
            405,
            response.status().as_u16(),
            "The API did not return 405 for {method}."
        );
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Method not allowed" }));
    }
}

#[tokio::test]
async fn options_returns_cors_headers_and_does_nothing_else() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(created("unexpected"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app.request(Method::OPTIONS).await;

    assert_eq!(200, response.status().as_u16());
    let headers = response.headers();
    assert_eq!(headers["Access-Control-Allow-Origin"], "*");
    assert_eq!(headers["Access-Control-Allow-Headers"], "Content-Type");
    assert_eq!(headers["Access-Control-Allow-Methods"], "POST, OPTIONS");
    assert_eq!(response.text().await.unwrap(), "");
}

#[tokio::test]
async fn options_is_not_allowed_under_redirect_style() {
    let app = spawn_redirect_app().await;

    let response = app.request(Method::OPTIONS).await;

    assert_eq!(405, response.status().as_u16());
}

#[tokio::test]
async fn subscribe_returns_500_and_skips_registration_when_the_welcome_email_fails() {
    let app = spawn_app().await;

    Mock::given(path("/emails"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "API key is invalid" })),
        )
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path(contacts_path()))
        .respond_with(created("contact-1"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app.post_json(&json!({ "email": "a@b.com" })).await;

    assert_eq!(500, response.status().as_u16());
    assert_eq!(response.headers()["Access-Control-Allow-Origin"], "*");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Server error: API key is invalid" }));
}

#[tokio::test]
async fn subscribe_succeeds_even_if_contact_registration_fails() {
    let app = spawn_app().await;

    Mock::given(path("/emails"))
        .respond_with(created("email-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path(contacts_path()))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.post_json(&json!({ "email": "a@b.com" })).await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn subscribe_never_registers_contacts_without_an_audience() {
    let app = spawn_app_without_audience().await;

    Mock::given(path("/emails"))
        .respond_with(created("email-1"))
        .expect(1)
        .mount(&app.email_server)
        .await;
    Mock::given(path(contacts_path()))
        .respond_with(created("contact-1"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app.post_json(&json!({ "email": "a@b.com" })).await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn malformed_json_is_a_server_error() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(created("unexpected"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app
        .api_client
        .post(app.subscriptions_url())
        .header("Content-Type", "application/json")
        .body("{\"email\": ")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(500, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Server error: ")
    );
}

#[tokio::test]
async fn json_arrays_are_not_subscriptions() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(created("unexpected"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app.post_json(&json!(["a@b.com"])).await;

    assert_eq!(400, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Please provide a valid email address" }));
}

#[tokio::test]
async fn oversized_bodies_are_rejected_with_cors_headers() {
    let app = spawn_app_with(|c| c.application.max_body_bytes = 64).await;

    Mock::given(any())
        .respond_with(created("unexpected"))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app
        .post_json(&json!({ "email": "a@b.com", "note": "x".repeat(256) }))
        .await;

    assert_eq!(500, response.status().as_u16());
    assert_eq!(
        response
            .headers()
            .get("Access-Control-Allow-Origin")
            .unwrap(),
        "*"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Server error: The request body is larger than 64 bytes"
    );
}
