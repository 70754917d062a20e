//! End-to-end tests driving the router in-process

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use docvault_common::{
    config::{AppConfig, TenantConfig},
    embeddings::{DisabledEmbedder, Embedder, HashingEmbedder},
    errors::{AppError, Result},
    llm::{GenerationRequest, Generator},
    query_log::QueryLog,
};
use docvault_gateway::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "docvault-test-boundary";
const QUESTION: &str = "Sous combien de jours doit-on déclarer ?";

/// Answers with a fixed reply, or fails when there is none
struct FixedGenerator(Option<&'static str>);

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| AppError::provider("generation", "offline"))
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

fn test_config(dir: &tempfile::TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.tenants = vec![
        TenantConfig {
            id: "tenantA".into(),
            api_key: "tenantA_key".into(),
        },
        TenantConfig {
            id: "tenantB".into(),
            api_key: "tenantB_key".into(),
        },
    ];
    config.storage.data_dir = dir.path().to_path_buf();
    config.ingestion.max_file_bytes = 1024;
    config.rate_limit.enabled = false;
    config
}

fn build_app(
    reply: Option<&'static str>,
    embedder: Arc<dyn Embedder>,
    configure: impl FnOnce(&mut AppConfig),
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);
    let generator: Arc<dyn Generator> = Arc::new(FixedGenerator(reply));

    let state = AppState::new(config, embedder, generator, QueryLog::in_memory(20)).unwrap();
    TestApp {
        router: create_router(state),
        _dir: dir,
    }
}

fn app_with(reply: Option<&'static str>) -> TestApp {
    build_app(reply, Arc::new(HashingEmbedder::new(512)), |_| {})
}

fn app() -> TestApp {
    app_with(Some("Il faut déclarer sous 5 jours ouvrés [1]."))
}

fn multipart(filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn upload(app: &TestApp, key: &str, filename: &str, content: &[u8]) -> (StatusCode, Value) {
    let request = Request::post("/upload")
        .header("X-API-KEY", key)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart(filename, content)))
        .unwrap();
    send(app, request).await
}

async fn query(app: &TestApp, key: Option<&str>, question: &str) -> (StatusCode, Value) {
    let mut request = Request::post("/query").header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        request = request.header("X-API-KEY", key);
    }
    let request = request
        .body(Body::from(json!({ "question": question }).to_string()))
        .unwrap();
    send(app, request).await
}

async fn stats(app: &TestApp, key: &str, tenant: &str) -> (StatusCode, Value) {
    let request = Request::get(format!("/stats/{tenant}"))
        .header("X-API-KEY", key)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

#[tokio::test]
async fn health_needs_no_credential() {
    let app = app();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tenants"], 2);
    assert_eq!(body["providers"]["generation"]["model"], "fixed");
}

#[tokio::test]
async fn missing_or_unknown_credential_is_rejected() {
    let app = app();

    let (status, body) = query(&app, None, QUESTION).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, body) = query(&app, Some("fake_key_12345"), QUESTION).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_API_KEY");
    assert!(body.get("no_answer").is_none());

    let (status, _) = upload(&app, "fake_key_12345", "docA1.txt", b"texte").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn answers_from_uploaded_document() {
    let app = app();
    let (status, body) = upload(
        &app,
        "tenantA_key",
        "docA1.txt",
        "déclaration sous 5 jours ouvrés".as_bytes(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "docA1.txt");
    assert_eq!(body["chunks_count"], 1);
    assert_eq!(body["file_size_bytes"], 33);

    let (status, body) = query(&app, Some("tenantA_key"), QUESTION).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], "tenantA");
    assert_eq!(body["no_answer"], false);
    assert_eq!(body["answer"], "Il faut déclarer sous 5 jours ouvrés [1].");
    assert_eq!(body["answer_mode"], "generated");
    assert_eq!(body["retrieval_mode"], "semantic");

    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["doc_id"], "docA1.txt");
    assert_eq!(sources[0]["chunk_id"], 0);
    assert_eq!(sources[0]["excerpt"], "déclaration sous 5 jours ouvrés");
    assert!(sources[0]["score"].as_f64().unwrap() >= 0.30);
}

#[tokio::test]
async fn lexical_retrieval_answers_without_embeddings() {
    let app = build_app(
        Some("Il faut déclarer sous 5 jours ouvrés [1]."),
        Arc::new(DisabledEmbedder),
        |_| {},
    );
    let (status, body) = upload(
        &app,
        "tenantA_key",
        "docA1.txt",
        "déclaration sous 5 jours ouvrés".as_bytes(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["embedded"], false);

    let (status, body) = query(&app, Some("tenantA_key"), QUESTION).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["no_answer"], false);
    assert_eq!(body["retrieval_mode"], "lexical");
    assert_eq!(body["answer_mode"], "generated");
    assert_eq!(body["sources"][0]["doc_id"], "docA1.txt");
    assert!(body["sources"][0]["score"].as_f64().unwrap() >= 0.12);
}

#[tokio::test]
async fn request_id_uses_configured_header() {
    let app = build_app(None, Arc::new(HashingEmbedder::new(512)), |config| {
        config.auth.request_id_header = "x-correlation-id".into();
    });

    let request = Request::get("/health")
        .header("x-correlation-id", "trace-42")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "trace-42");

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-correlation-id"));
    assert!(!response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn cross_tenant_question_has_no_answer() {
    let app = app();
    upload(
        &app,
        "tenantA_key",
        "docA1.txt",
        "déclaration sous 5 jours ouvrés".as_bytes(),
    )
    .await;
    upload(
        &app,
        "tenantB_key",
        "docB1.txt",
        "La résiliation du contrat prend effet après un préavis trimestriel.".as_bytes(),
    )
    .await;

    let (status, body) = query(&app, Some("tenantB_key"), QUESTION).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], "tenantB");
    assert_eq!(body["no_answer"], true);
    assert_eq!(body["answer"], "");
    assert_eq!(body["sources"], json!([]));
    assert_eq!(body["retrieval_mode"], "none");
}

#[tokio::test]
async fn generation_outage_degrades_to_excerpt() {
    let app = app_with(None);
    upload(
        &app,
        "tenantA_key",
        "docA1.txt",
        "déclaration sous 5 jours ouvrés".as_bytes(),
    )
    .await;

    let (status, body) = query(&app, Some("tenantA_key"), QUESTION).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["no_answer"], false);
    assert_eq!(body["degraded"], true);
    assert_eq!(body["answer_mode"], "extractive");
    assert_eq!(body["answer"], "déclaration sous 5 jours ouvrés");
}

#[tokio::test]
async fn invalid_uploads_are_rejected_without_indexing() {
    let app = app();

    let cases: [(&str, &[u8]); 5] = [
        ("empty.txt", b""),
        ("report.pdf", b"%PDF-1.7"),
        ("binary.txt", &[0xff, 0xfe, 0x00, 0x01]),
        ("big.txt", &[b'a'; 2048]),
        ("../escape.txt", b"texte"),
    ];
    for (filename, content) in cases {
        let (status, body) = upload(&app, "tenantA_key", filename, content).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "upload {:?}", filename);
        assert!(body["error"]["message"].is_string());
    }

    let (_, body) = stats(&app, "tenantA_key", "tenantA").await;
    assert_eq!(body["documents"], 0);
    assert_eq!(body["chunks"], 0);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let app = app();
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nbonjour\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::post("/upload")
        .header("X-API-KEY", "tenantA_key")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "file");
}

#[tokio::test]
async fn reupload_replaces_previous_chunks() {
    let app = app();
    let long_text = "Les congés payés sont posés trois semaines à l'avance. ".repeat(12);
    let (_, first) = upload(&app, "tenantA_key", "policy.txt", long_text.as_bytes()).await;
    assert!(first["chunks_count"].as_u64().unwrap() > 1);

    let (status, _) = upload(&app, "tenantA_key", "policy.txt", b"Version courte.").await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = stats(&app, "tenantA_key", "tenantA").await;
    assert_eq!(body["documents"], 1);
    assert_eq!(body["chunks"], 1);
}

#[tokio::test]
async fn question_length_is_validated() {
    let app = app();

    let (status, _) = query(&app, Some("tenantA_key"), "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = query(&app, Some("tenantA_key"), &"q".repeat(2001)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn stats_are_private_to_the_tenant() {
    let app = app();
    upload(
        &app,
        "tenantA_key",
        "docA1.txt",
        "déclaration sous 5 jours ouvrés".as_bytes(),
    )
    .await;
    query(&app, Some("tenantA_key"), QUESTION).await;
    query(&app, Some("tenantA_key"), "Quelle est la couleur du ciel ?").await;

    let (status, _) = stats(&app, "tenantB_key", "tenantA").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = stats(&app, "tenantA_key", "tenantA").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], "tenantA");
    assert_eq!(body["total_queries"], 2);
    assert_eq!(body["generated_queries"], 1);
    assert_eq!(body["no_answer_queries"], 1);
    assert_eq!(body["documents"], 1);

    let recent = body["recent_queries"].as_array().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["question"], "Quelle est la couleur du ciel ?");
    assert_eq!(recent[0]["no_answer"], true);
    assert_eq!(recent[1]["sources_count"], 1);

    assert!(body["last_query_at"].is_string());

    let (_, body) = stats(&app, "tenantB_key", "tenantB").await;
    assert_eq!(body["total_queries"], 0);
    assert!(body["last_query_at"].is_null());
}
