//! Integration tests for the reporting client.
//!
//! These tests start a `jsreport-local` server on a random port and drive it
//! through `ReportingService`.

use std::time::Duration;

use jsreport_client::{
    CancellationToken, Engine, FALLBACK_ERROR_MESSAGE, Recipe, RenderOptions, RenderPayload,
    RenderRequest, ReportError, ReportingApi, ReportingService, Template,
};
use jsreport_local::{LocalReporting, LocalServer, StoredTemplate};
use serde::Serialize;
use serde_json::json;

/// Helper: spawn an unauthenticated test server on port 0.
async fn spawn_test_server() -> (LocalServer, ReportingService) {
    let server = LocalReporting::new().start().await.unwrap();
    let service = ReportingService::new(&server.uri()).unwrap();
    (server, service)
}

fn html(content: &str) -> RenderRequest {
    RenderRequest::new(Template::inline(content, Engine::None, Recipe::Html))
}

fn invoice_template() -> StoredTemplate {
    StoredTemplate {
        shortid: "rkJTnK2ce".into(),
        name: "invoice-main".into(),
        content: "Invoice {{:number}}".into(),
        engine: "jsrender".into(),
        recipe: "html".into(),
        helpers: None,
    }
}

#[derive(Serialize)]
struct Invoice {
    number: u32,
}

// ── Rendering ────────────────────────────────────────────────────────

#[tokio::test]
async fn renders_html() {
    let (_server, service) = spawn_test_server().await;

    let report = service.render(html("foo")).await.unwrap();
    assert_eq!(report.content.text().await.unwrap(), "foo");
}

#[tokio::test]
async fn renders_pdf() {
    let (_server, service) = spawn_test_server().await;

    let request = RenderRequest::new(Template::inline("foo", Engine::None, Recipe::PhantomPdf));
    let report = service.render(request).await.unwrap();
    assert_eq!(report.meta.content_type(), Some("application/pdf"));
    let bytes = report.content.bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn renders_jsrender_with_data() {
    let (_server, service) = spawn_test_server().await;

    let request = RenderRequest::new(Template::inline("{{:foo}}", Engine::Jsrender, Recipe::Html))
        .with_data(&json!({ "foo": "hello" }))
        .unwrap();
    let text = service.render(request).await.unwrap().content.text().await.unwrap();
    assert!(text.starts_with("hello"));
}

#[tokio::test]
async fn preview_xlsx_is_an_iframe_page() {
    let (_server, service) = spawn_test_server().await;

    let request = RenderRequest::new(Template::inline(
        "<table><tr><td>a</td></tr></table>",
        Engine::Jsrender,
        Recipe::HtmlToXlsx,
    ))
    .with_options(RenderOptions {
        preview: Some(true),
        ..RenderOptions::default()
    });
    let text = service.render(request).await.unwrap().content.text().await.unwrap();
    assert!(text.contains("iframe"));
}

#[tokio::test]
async fn metadata_comes_from_headers() {
    let (_server, service) = spawn_test_server().await;

    let report = service.render(html("foo")).await.unwrap();
    let meta = &report.meta;
    assert_eq!(meta.file_extension(), Some("html"));
    assert_eq!(meta.file_name(), Some("report.html"));
    assert!(meta.report_id().is_some());
    assert!(meta.get("Content-Type").is_some_and(|ct| ct.starts_with("text/html")));
}

#[tokio::test]
async fn report_saves_to_file() {
    let (_server, service) = spawn_test_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.html");

    let report = service.render(html("saved")).await.unwrap();
    assert_eq!(report.save(&path).await.unwrap(), 5);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved");
}

// ── Request shapes ───────────────────────────────────────────────────

#[tokio::test]
async fn stored_template_shapes_send_equivalent_bodies() {
    let server = LocalReporting::new()
        .with_template(invoice_template())
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri()).unwrap();

    let typed = RenderRequest::new(Template::by_shortid("rkJTnK2ce"))
        .with_data(&Invoice { number: 7 })
        .unwrap();
    let a = service.render(typed).await.unwrap().content.text().await.unwrap();
    let b = service
        .render_by_shortid("rkJTnK2ce", &Invoice { number: 7 })
        .await
        .unwrap()
        .content
        .text()
        .await
        .unwrap();
    let c = service
        .render_by_shortid_json("rkJTnK2ce", r#"{"number":7}"#)
        .await
        .unwrap()
        .content
        .text()
        .await
        .unwrap();
    let d = service
        .render_value(&json!({ "template": { "shortid": "rkJTnK2ce" }, "data": { "number": 7 } }))
        .await
        .unwrap()
        .content
        .text()
        .await
        .unwrap();
    assert_eq!(a, "Invoice 7");
    assert_eq!([&b, &c, &d], [&a, &a, &a]);

    let bodies: Vec<_> = server.requests().into_iter().map(|r| r.body).collect();
    assert_eq!(bodies.len(), 4);
    assert!(bodies.iter().all(|body| *body == bodies[0]));
}

#[tokio::test]
async fn renders_stored_template_by_name() {
    let server = LocalReporting::new()
        .with_template(invoice_template())
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri()).unwrap();

    let by_name = service
        .render_by_name("invoice-main", &Invoice { number: 3 })
        .await
        .unwrap();
    assert_eq!(by_name.content.text().await.unwrap(), "Invoice 3");

    let by_name_json = service
        .render_by_name_json("invoice-main", r#"{"number":4}"#)
        .await
        .unwrap();
    assert_eq!(by_name_json.content.text().await.unwrap(), "Invoice 4");

    let recorded = server.requests();
    assert_eq!(recorded[0].body["template"], json!({ "name": "invoice-main" }));
}

#[tokio::test]
async fn compression_gives_same_output() {
    let (server, service) = spawn_test_server().await;

    let plain = service.render(html("foo")).await.unwrap();
    let compressed = service.with_compression(true).render(html("foo")).await.unwrap();
    assert_eq!(
        plain.content.text().await.unwrap(),
        compressed.content.text().await.unwrap()
    );

    let recorded = server.requests();
    assert_eq!(recorded[0].content_encoding, None);
    assert_eq!(recorded[1].content_encoding.as_deref(), Some("gzip"));
    assert_eq!(recorded[0].body, recorded[1].body);
}

// ── Errors ───────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_engine_is_a_render_error() {
    let (_server, service) = spawn_test_server().await;

    let request = RenderRequest::new(Template::inline(
        "foo",
        Engine::from("NOT_EXISTING"),
        Recipe::Html,
    ));
    let err = service.render(request).await.unwrap_err();
    let render = err.render_error().expect("render error");
    assert_eq!(render.status_code(), 400);
    assert!(render.message().contains("NOT_EXISTING"));
    assert!(render.response_error_message().contains("NOT_EXISTING"));
}

#[tokio::test]
async fn missing_helper_is_named() {
    let (_server, service) = spawn_test_server().await;

    let request = RenderRequest::new(Template::inline(
        "{{:~foo()}}",
        Engine::Jsrender,
        Recipe::Html,
    ));
    let err = service.render(request).await.unwrap_err();
    assert!(err.render_error().unwrap().message().contains("foo"));
}

#[tokio::test]
async fn unknown_stored_template_is_not_found() {
    let (_server, service) = spawn_test_server().await;

    let err = service.render_by_shortid_json("nope", "{}").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn slow_server_render_is_a_500_render_error() {
    let server = LocalReporting::new()
        .render_delay(Duration::from_millis(300))
        .render_timeout(Duration::from_millis(50))
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri()).unwrap();

    let err = service.render(html("foo")).await.unwrap_err();
    let render = err.render_error().expect("render error");
    assert_eq!(render.status_code(), 500);
    assert!(render.message().contains("Timeout during render"));
    assert_ne!(render.response_error_message(), FALLBACK_ERROR_MESSAGE);
}

// ── Cancellation ─────────────────────────────────────────────────────

#[tokio::test]
async fn client_timeout_cancels() {
    let server = LocalReporting::new()
        .render_delay(Duration::from_secs(2))
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(50));

    let err = service.render(html("foo")).await.unwrap_err();
    assert!(matches!(err, ReportError::Cancelled));
}

#[tokio::test]
async fn caller_token_cancels() {
    let server = LocalReporting::new()
        .render_delay(Duration::from_secs(2))
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = service
        .render_cancellable(html("foo"), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn already_cancelled_token_never_sends() {
    let (server, service) = spawn_test_server().await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = service
        .render_cancellable(html("foo"), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn client_timeout_covers_a_stalled_report_body() {
    let server = LocalReporting::new()
        .stall_body(Duration::from_secs(30))
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(200));

    // Headers and the first half of the body arrive well within the timeout.
    let report = service.render(html("hello world")).await.unwrap();
    let read = tokio::time::timeout(Duration::from_secs(5), report.content.text())
        .await
        .expect("body read must not outlive the configured timeout");
    assert!(matches!(read, Err(ReportError::Cancelled)));
}

#[tokio::test]
async fn caller_token_covers_a_stalled_report_body() {
    let server = LocalReporting::new()
        .stall_body(Duration::from_secs(30))
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri()).unwrap();

    let cancel = CancellationToken::new();
    let report = service
        .render_cancellable(html("hello world"), &cancel)
        .await
        .unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let read = tokio::time::timeout(Duration::from_secs(5), report.content.text())
        .await
        .expect("body read must stop when the token is cancelled");
    assert!(read.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn stalled_body_completes_without_limits() {
    let server = LocalReporting::new()
        .stall_body(Duration::from_millis(50))
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_secs(10));

    let report = service.render(html("hello world")).await.unwrap();
    assert_eq!(report.content.text().await.unwrap(), "hello world");
}

// ── Server information ───────────────────────────────────────────────

#[tokio::test]
async fn lists_recipes_and_engines() {
    let (_server, service) = spawn_test_server().await;

    let recipes = service.list_recipes().await.unwrap();
    let engines = service.list_engines().await.unwrap();
    assert!(recipes.len() > 1);
    assert!(engines.len() > 1);
    assert!(recipes.iter().any(|r| r == "html"));
}

#[tokio::test]
async fn reports_server_version() {
    let (_server, service) = spawn_test_server().await;

    let version = service.server_version().await.unwrap();
    assert!(version.contains('.'));
}

#[tokio::test]
async fn trait_object_dispatches_to_service() {
    let (_server, service) = spawn_test_server().await;
    let api: Box<dyn ReportingApi> = Box::new(service);

    let payload = RenderPayload::from(html("via trait"));
    let report = api.render_payload(payload, None).await.unwrap();
    assert_eq!(report.content.text().await.unwrap(), "via trait");
    assert!(api.server_version().await.unwrap().contains('.'));
}

// ── Authentication ───────────────────────────────────────────────────

#[tokio::test]
async fn authenticated_server_accepts_credentials() {
    let server = LocalReporting::new()
        .authenticated("admin", "password")
        .start()
        .await
        .unwrap();
    let service = ReportingService::with_credentials(&server.uri(), "admin", "password").unwrap();

    let report = service.render(html("foo")).await.unwrap();
    assert_eq!(report.content.text().await.unwrap(), "foo");
    assert!(service.server_version().await.unwrap().contains('.'));
    assert_eq!(
        server.requests()[0].authorization.as_deref(),
        Some("Basic YWRtaW46cGFzc3dvcmQ=")
    );
}

#[tokio::test]
async fn authenticated_server_rejects_anonymous_calls() {
    let server = LocalReporting::new()
        .authenticated("admin", "password")
        .start()
        .await
        .unwrap();
    let service = ReportingService::new(&server.uri()).unwrap();

    // Render failures are always structured, whatever the status.
    let err = service.render(html("foo")).await.unwrap_err();
    let render = err.render_error().expect("render error");
    assert_eq!(render.status_code(), 401);
    assert!(render.message().contains("Unauthorized"));

    // Plain endpoints surface the status as a network error.
    let err = service.server_version().await.unwrap_err();
    assert!(matches!(err, ReportError::Http(_)));
    assert_eq!(err.status(), Some(401));

    let err = service.list_recipes().await.unwrap_err();
    assert!(matches!(err, ReportError::Http(_)));
}
