/*!
 * End-to-end tests of the HTTP transport over mock capabilities
 */

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;

use bulletwise::app_config::Config;
use bulletwise::pipeline::generation_divider;
use bulletwise::providers::mock::{GeneratorTail, MockGenerator, MockTranslator};
use bulletwise::server::{AppState, router};

use crate::common::{mock_pipeline, mock_pipeline_with, test_settings};

fn app(generator: MockGenerator, translator: MockTranslator) -> axum::Router {
    router(AppState::new(
        mock_pipeline(generator, translator),
        Config::default().base_generation(),
    ))
}

fn summarize(body: &str, accept: &str) -> Request<Body> {
    Request::post("/summarize")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, accept)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Test the text layout with back-translation: each bullet followed by its source-language line
#[tokio::test]
async fn test_summarize_textWithBackTranslation_shouldPairLines() {
    let translator = MockTranslator::working()
        .with_entry("שלום.", "Hello.")
        .with_entry("\u{2022} Greeting.", "\u{2022} ברכה.")
        .with_entry("\u{2022} Farewell.", "\u{2022} פרידה.");
    let generator = MockGenerator::with_bullets(&["Greeting.", "Farewell."], 3);
    let app = app(generator, translator);

    let response = app
        .oneshot(summarize(r#"{"text":"שלום.","back_translate":true}"#, "text/plain"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let expected = format!(
        "TRANSLATION: Hello.\n{}\u{2022} Greeting.\n\u{2022} ברכה.\n\u{2022} Farewell.\n\u{2022} פרידה.\n",
        generation_divider()
    );
    assert_eq!(read_body(response).await, expected);
}

/// Test that a translator slower than the generator still yields paired lines
#[tokio::test]
async fn test_summarize_slowBackTranslation_shouldKeepPairsTogether() {
    let translator = MockTranslator::working()
        .with_entry("\u{2022} One.", "\u{2022} אחת.")
        .with_entry("\u{2022} Two.", "\u{2022} שתיים.")
        .with_entry("\u{2022} Three.", "\u{2022} שלוש.")
        .with_delay(Duration::from_millis(40));
    let app = app(MockGenerator::with_bullets(&["One.", "Two.", "Three."], 2), translator);

    let response = app
        .oneshot(summarize(r#"{"text":"שלום.","back_translate":true}"#, "text/plain"))
        .await
        .unwrap();
    let body = read_body(response).await;

    let summary = body.split(&generation_divider()).nth(1).unwrap();
    assert_eq!(
        summary,
        "\u{2022} One.\n\u{2022} אחת.\n\u{2022} Two.\n\u{2022} שתיים.\n\u{2022} Three.\n\u{2022} שלוש.\n"
    );
}

/// Test that a mid-stream failure keeps the 200 status and is framed into the body
#[tokio::test]
async fn test_summarize_generationFailsMidStream_shouldFrameError() {
    let generator = MockGenerator::from_fragments(["\u{2022} Partial bullet.\n"]).with_tail(GeneratorTail::Fail);
    let app = app(generator, MockTranslator::working());

    let response = app.oneshot(summarize(r#"{"text":"שלום."}"#, "*/*")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    assert!(body.contains("\u{2022} Partial bullet.\n"));
    assert!(body.contains("\n[ERROR generation_failure] "));
}

/// Test the NDJSON stream of a request with a per-bullet failure
#[tokio::test]
async fn test_summarize_ndjsonWithFailingBullet_shouldReportIndex() {
    let app = app(
        MockGenerator::with_bullets(&["Keep.", "Break here.", "Keep too."], 7),
        MockTranslator::fail_on("Break"),
    );

    let response = app
        .oneshot(summarize(r#"{"text":"שלום.","back_translate":true}"#, "application/x-ndjson"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    let events: Vec<serde_json::Value> = body.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["kind"], "back_translation_failure");
    assert_eq!(error["index"], 2);
    assert_eq!(events.iter().filter(|e| e["type"] == "back_translated_ready").count(), 2);
    assert_eq!(events.last().unwrap()["type"], "done");
}

/// Test that a busy generator is reported as 503 before any body is written
#[tokio::test]
async fn test_summarize_generatorBusy_shouldReturn503() {
    let generator = MockGenerator::endless("word ").with_fragment_delay(Duration::from_millis(10));
    let pipeline = mock_pipeline_with(
        generator,
        MockTranslator::working(),
        Duration::from_millis(50),
        test_settings(),
    );
    let state = AppState::new(pipeline, Config::default().base_generation());

    let holder = state
        .pipeline
        .start(bulletwise::pipeline::SummaryRequest::new("שלום."))
        .await
        .unwrap();

    let response = router(state)
        .oneshot(summarize(r#"{"text":"שלום."}"#, "application/x-ndjson"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(json["error"], "resource_exhausted");

    drop(holder);
}
