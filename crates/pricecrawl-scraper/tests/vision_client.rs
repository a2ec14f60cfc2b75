//! Integration tests for `VisionClient` against a wiremock Messages API.

use std::io::Cursor;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use pricecrawl_scraper::extract::vision::interpret_answer;
use pricecrawl_scraper::{VisionClient, VisionError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> VisionClient {
    VisionClient::with_base_url("test-key", "test-model", base_url, 5)
        .expect("client construction should not fail")
        .with_retry(3, Duration::ZERO)
}

fn tiny_png() -> Vec<u8> {
    let img = RgbImage::from_pixel(4, 4, Rgb([200, 30, 30]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn text_response(text: &str) -> serde_json::Value {
    json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn"
    })
}

#[tokio::test]
async fn describe_returns_model_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "model": "test-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
            "Products:\n[{\"name\": \"Milk 1L\", \"price\": 19.99, \"unit\": null}]",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let text = test_client(&server.uri())
        .describe(&tiny_png(), "list products")
        .await
        .expect("describe should succeed");

    let records = interpret_answer(&text, "https://testmart.example/c/a").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].fields["name"], "Milk 1L");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("[]")))
        .expect(1)
        .mount(&server)
        .await;

    let text = test_client(&server.uri())
        .describe(&tiny_png(), "list products")
        .await
        .unwrap();
    assert_eq!(text, "[]");
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .describe(&tiny_png(), "list products")
        .await
        .unwrap_err();
    assert!(matches!(err, VisionError::Status { status: 401, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rate_limit_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .describe(&tiny_png(), "list products")
        .await
        .unwrap_err();
    assert!(matches!(err, VisionError::Status { status: 429, .. }));
}

#[tokio::test]
async fn undecodable_screenshot_never_reaches_the_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("[]")))
        .expect(0)
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .describe(b"not a png", "list products")
        .await
        .unwrap_err();
    assert!(matches!(err, VisionError::Image(_)));
}
